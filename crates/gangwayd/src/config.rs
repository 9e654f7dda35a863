//! Daemon configuration, read from the environment at startup.

use gangway_core::SystemAllowList;
use std::env;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/gangwayd.sock";
pub const DEFAULT_AUDIT_LOG: &str = "/tmp/gangwayd-audit.jsonl";
pub const DEFAULT_DEMO_MAX_CONTAINERS: usize = 10;

/// Runtime configuration for the gateway daemon.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Unix socket the daemon listens on.
    pub socket_path: String,

    /// When set, spawn enforces the running-container quota.
    pub demo_mode: bool,

    /// Quota applied in demo mode (non-system containers only).
    pub demo_max_containers: usize,

    /// Containers hidden from listings and exempt from the quota.
    pub system: SystemAllowList,

    /// Where audit records are appended.
    pub audit_log: PathBuf,

    /// Access-control grants, `subject:action` comma separated.
    pub grants: String,
}

impl GatewayConfig {
    /// Builds the configuration from `GANGWAY_*` environment variables,
    /// falling back to defaults. Unparseable values are replaced by the
    /// default with a warning rather than aborting startup.
    pub fn from_env() -> Self {
        let socket_path =
            env::var("GANGWAY_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string());

        let demo_mode = env::var("GANGWAY_DEMO_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let demo_max_containers = match env::var("GANGWAY_DEMO_MAX_CONTAINERS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid GANGWAY_DEMO_MAX_CONTAINERS, using default");
                DEFAULT_DEMO_MAX_CONTAINERS
            }),
            Err(_) => DEFAULT_DEMO_MAX_CONTAINERS,
        };

        let system = SystemAllowList::new(
            parse_list(env::var("GANGWAY_SYSTEM_IMAGES").ok()),
            parse_list(env::var("GANGWAY_SYSTEM_NAMES").ok()),
        );

        let audit_log = env::var("GANGWAY_AUDIT_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_AUDIT_LOG));

        let grants = env::var("GANGWAY_GRANTS").unwrap_or_default();

        GatewayConfig {
            socket_path,
            demo_mode,
            demo_max_containers,
            system,
            audit_log,
            grants,
        }
    }
}

fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_trims_and_drops_empties() {
        let parsed = parse_list(Some(" nginx:alpine, registry:2 ,,traefik ".to_string()));
        assert_eq!(parsed, vec!["nginx:alpine", "registry:2", "traefik"]);
        assert!(parse_list(None).is_empty());
    }
}
