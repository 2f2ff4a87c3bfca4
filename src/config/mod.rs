use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_API_GET_PATH: &str = "/api/get";
const DEFAULT_API_POST_PATH: &str = "/api/post";
const DEFAULT_WEBHOOK_PATH: &str = "/git";
const DEFAULT_REFRESH_INTERVAL: &str = "1h";
const DEFAULT_REFRESH_LIMIT: &str = "5m";

/// Configuration errors are fatal; the process must not start with a
/// partially valid environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is required and must not be empty")]
    Missing { var: &'static str },
    #[error("invalid {var} '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("auth requires both username and password")]
    PartialAuth,
    #[error("auto-refresh interval cannot be shorter than the refresh limit")]
    IntervalBelowLimit,
}

/// HTTP Basic credential pair guarding the secret endpoints.
#[derive(Debug, Clone)]
pub struct ApiAuthConfig {
    pub user: String,
    pub pass: String,
}

/// Webhook dialect served on the webhook route, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    Github,
    Gitlab,
}

impl WebhookProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

impl std::fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            _ => Err(ConfigError::Invalid {
                var: "GIT_WEBHOOK_TYPE",
                value: s.to_string(),
                reason: "expected 'github' or 'gitlab'".to_string(),
            }),
        }
    }
}

/// Immutable process configuration, loaded from the environment once at
/// startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub api_get_path: String,
    pub api_post_path: String,
    pub api_auth: Option<ApiAuthConfig>,
    pub git_push_enabled: bool,
    pub webhook_path: String,
    pub webhook_secret: String,
    pub webhook_provider: WebhookProvider,
    /// Period of the automatic refresh loop; zero disables it.
    pub refresh_interval: Duration,
    /// Minimum spacing between unforced refreshes; zero disables limiting.
    pub refresh_limit: Duration,
}

impl Config {
    /// Load configuration from the process environment. Empty variables
    /// count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load configuration from explicit key/value pairs.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw_listen = get_or(vars, "LISTEN_ADDRESS", DEFAULT_LISTEN_ADDRESS);
        let listen_address = raw_listen
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::Invalid {
                var: "LISTEN_ADDRESS",
                value: raw_listen.clone(),
                reason: err.to_string(),
            })?;

        let api_get_path = route_path(vars, "API_GET_PATH", DEFAULT_API_GET_PATH)?;
        let api_post_path = route_path(vars, "API_POST_PATH", DEFAULT_API_POST_PATH)?;
        let webhook_path = route_path(vars, "GIT_WEBHOOK_PATH", DEFAULT_WEBHOOK_PATH)?;

        let user = get_or(vars, "API_AUTH_USER", "");
        let pass = get_or(vars, "API_AUTH_PASS", "");
        let api_auth = match (user.is_empty(), pass.is_empty()) {
            (false, false) => Some(ApiAuthConfig { user, pass }),
            (true, true) => None,
            _ => return Err(ConfigError::PartialAuth),
        };

        let git_push_enabled = parse_bool(vars, "GIT_PUSH_ENABLED", false)?;

        let webhook_secret = get_or(vars, "GIT_WEBHOOK_SECRET", "");
        if webhook_secret.is_empty() {
            return Err(ConfigError::Missing {
                var: "GIT_WEBHOOK_SECRET",
            });
        }

        let webhook_type = get_or(vars, "GIT_WEBHOOK_TYPE", "");
        if webhook_type.is_empty() {
            return Err(ConfigError::Missing {
                var: "GIT_WEBHOOK_TYPE",
            });
        }
        let webhook_provider: WebhookProvider = webhook_type.parse()?;

        let refresh_interval = parse_duration(vars, "REFRESH_INTERVAL", DEFAULT_REFRESH_INTERVAL)?;
        let refresh_limit = parse_duration(vars, "REFRESH_LIMIT", DEFAULT_REFRESH_LIMIT)?;
        if !refresh_interval.is_zero() && refresh_interval < refresh_limit {
            return Err(ConfigError::IntervalBelowLimit);
        }

        Ok(Self {
            listen_address,
            api_get_path,
            api_post_path,
            api_auth,
            git_push_enabled,
            webhook_path,
            webhook_secret,
            webhook_provider,
            refresh_interval,
            refresh_limit,
        })
    }

    /// JSON rendering with credentials redacted, for `config show`.
    pub fn redacted(&self) -> serde_json::Value {
        json!({
            "listenAddress": self.listen_address.to_string(),
            "apiGetPath": self.api_get_path,
            "apiPostPath": self.api_post_path,
            "apiAuth": self.api_auth.as_ref().map(|auth| {
                json!({ "user": auth.user, "pass": redact_secret(&auth.pass) })
            }),
            "gitPushEnabled": self.git_push_enabled,
            "webhookPath": self.webhook_path,
            "webhookSecret": redact_secret(&self.webhook_secret),
            "webhookProvider": self.webhook_provider.as_str(),
            "refreshInterval": humantime::format_duration(self.refresh_interval).to_string(),
            "refreshLimit": humantime::format_duration(self.refresh_limit).to_string(),
        })
    }
}

/// Read a variable, treating empty as unset.
fn get_or(vars: &HashMap<String, String>, var: &str, default: &str) -> String {
    match vars.get(var) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

fn route_path(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: &str,
) -> Result<String, ConfigError> {
    let path = get_or(vars, var, default);
    if !path.starts_with('/') {
        return Err(ConfigError::Invalid {
            var,
            value: path,
            reason: "route paths must start with '/'".to_string(),
        });
    }
    Ok(path)
}

fn parse_bool(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let raw = get_or(vars, var, "");
    if raw.is_empty() {
        return Ok(default);
    }
    match raw.to_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_duration(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: &str,
) -> Result<Duration, ConfigError> {
    let raw = get_or(vars, var, default);
    // humantime requires a unit; accept a bare "0" to disable.
    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(&raw).map_err(|err| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: err.to_string(),
    })
}

/// Redact a secret for display, keeping the first and last two chars.
fn redact_secret(value: &str) -> String {
    if value.len() <= 6 {
        return "***".to_string();
    }
    format!("{}…{}", &value[..2], &value[value.len() - 2..])
}
