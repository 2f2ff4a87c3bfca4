use crate::config::Config;
use crate::gateway::routes;
use crate::refresh::{spawn_auto_refresh, GopassGit, RepoRefresher};
use crate::store::{GopassStore, SecretAccessor};
use crate::webhook::WebhookDispatcher;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub secrets: Arc<SecretAccessor>,
    pub refresher: Arc<RepoRefresher>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub version: String,
}

/// The gateway server.
pub struct GatewayServer {
    state: GatewayState,
    addr: SocketAddr,
}

impl GatewayServer {
    /// Wire up the backend and prepare the server with the given
    /// configuration.
    pub async fn start(config: Config) -> Result<Self> {
        let store = Arc::new(GopassStore::new());
        let gopass_version = store
            .version()
            .await
            .context("failed to initialize gopass")?;
        info!("using {}", gopass_version);

        let git = Arc::new(GopassGit::new());
        let refresher = Arc::new(RepoRefresher::new(git, config.refresh_limit));
        let secrets = Arc::new(SecretAccessor::new(store, refresher.clone()));
        let webhooks = Arc::new(WebhookDispatcher::new(
            config.webhook_provider,
            config.webhook_secret.clone(),
            refresher.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);
        let addr = config.listen_address;

        let state = GatewayState {
            config: Arc::new(config),
            secrets,
            refresher,
            webhooks,
            shutdown_tx,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        if !state.config.refresh_interval.is_zero() {
            info!(
                "auto-refreshing repo every {}",
                humantime::format_duration(state.config.refresh_interval)
            );
            spawn_auto_refresh(
                state.refresher.clone(),
                state.config.refresh_interval,
                state.shutdown_tx.subscribe(),
            );
        }

        Ok(Self { state, addr })
    }

    /// Run the server until a shutdown signal is received.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let state = self.state.clone();
        let app = routes::build_routes(state.clone());

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        info!("passhook v{} listening on {}", state.version, self.addr);

        print_startup_banner(&state, &self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.state.shutdown_tx.clone()))
            .await?;

        info!("gateway shut down gracefully");
        Ok(())
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}

/// Print startup banner with server info.
fn print_startup_banner(state: &GatewayState, addr: &SocketAddr) {
    let auth_mode = if state.config.api_auth.is_some() {
        "basic"
    } else {
        "none"
    };

    info!("-------------------------------------------");
    info!("  passhook v{}", state.version);
    info!("  Listening on: http://{}", addr);
    info!("  Auth mode: {}", auth_mode);
    info!("  Get secret: GET {}", state.config.api_get_path);
    info!(
        "  Post secret: POST {} (enabled: {})",
        state.config.api_post_path, state.config.git_push_enabled
    );
    info!(
        "  Webhooks: {} on POST {}",
        state.config.webhook_provider, state.config.webhook_path
    );
    info!("  Health: http://{}/health", addr);
    info!("-------------------------------------------");
}
