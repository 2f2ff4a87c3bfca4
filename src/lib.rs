//! passhook serves secrets from a git-backed gopass store over HTTP and
//! keeps the local store in sync with its remote via provider webhooks and
//! a periodic refresh.

pub mod cli;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod refresh;
pub mod store;
pub mod webhook;
