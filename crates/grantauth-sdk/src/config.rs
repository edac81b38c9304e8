//! Coordinator configuration.
//!
//! Timing constants default to the protocol values (30 s staleness window,
//! one poll per second for 30 polls) and can be overridden from the
//! environment.

use std::time::Duration;

/// Tunables for one [`AuthCoordinator`](crate::AuthCoordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Storage namespace (NATS bucket/subject suffix, file name).
    pub namespace: String,
    /// Age after which an in-progress marker is treated as absent.
    pub stale_after: Duration,
    /// Delay between credential-store polls while waiting on a peer.
    pub poll_interval: Duration,
    /// Number of polls before a wait gives up.
    pub max_polls: u32,
    /// Optional network hint forwarded to the credential exchange.
    pub network_hint: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            namespace: "grantauth".to_string(),
            stale_after: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            max_polls: 30,
            network_hint: None,
        }
    }
}

impl CoordinatorConfig {
    /// Build the configuration from environment variables.
    ///
    /// | Variable                 | Default     | Description                       |
    /// |--------------------------|-------------|-----------------------------------|
    /// | `GRANTAUTH_NAMESPACE`    | `grantauth` | storage / bus namespace           |
    /// | `GRANTAUTH_NETWORK_HINT` | unset       | network hint sent on exchange     |
    /// | `GRANTAUTH_STALE_SECS`   | `30`        | marker staleness window (seconds) |
    /// | `GRANTAUTH_POLL_MS`      | `1000`      | peer-wait poll interval (ms)      |
    /// | `GRANTAUTH_MAX_POLLS`    | `30`        | peer-wait poll count              |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let namespace = std::env::var("GRANTAUTH_NAMESPACE")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.namespace);
        let network_hint = std::env::var("GRANTAUTH_NETWORK_HINT")
            .ok()
            .filter(|v| !v.is_empty());
        let stale_after = env_parse("GRANTAUTH_STALE_SECS")
            .map_or(defaults.stale_after, Duration::from_secs);
        let poll_interval = env_parse("GRANTAUTH_POLL_MS")
            .map_or(defaults.poll_interval, Duration::from_millis);
        let max_polls = env_parse("GRANTAUTH_MAX_POLLS")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.max_polls);

        Self {
            namespace,
            stale_after,
            poll_interval,
            max_polls,
            network_hint,
        }
    }

    /// Total time a waiting context spends before giving up.
    pub fn wait_budget(&self) -> Duration {
        self.poll_interval * self.max_polls
    }
}

fn env_parse(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
