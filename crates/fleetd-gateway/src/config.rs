//! Gateway configuration types.

/// Which capacity-query backend the controller serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substrate {
    /// Manually-enlisted machines; capacity queries are not supported.
    Manual,
    /// The built-in demo catalog of instance types.
    Catalog,
}

/// Configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:17070").
    pub listen_addr: String,

    /// Directory holding the state store.
    pub data_dir: String,

    /// The capacity-query backend to serve.
    pub substrate: Substrate,

    /// If set and no `admin` user exists, one is created at startup with
    /// this password and controller-admin capability.
    pub admin_password: Option<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    /// Load configuration from `FLEETD_*` environment variables, falling
    /// back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("FLEETD_LISTEN_ADDR")
                .unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("FLEETD_DATA_DIR").unwrap_or(defaults.data_dir),
            substrate: match std::env::var("FLEETD_SUBSTRATE").as_deref() {
                Ok("catalog") => Substrate::Catalog,
                _ => Substrate::Manual,
            },
            admin_password: std::env::var("FLEETD_ADMIN_PASSWORD").ok(),
            max_body_bytes: defaults.max_body_bytes,
            request_timeout_seconds: defaults.request_timeout_seconds,
        }
    }

    fn default_listen_addr() -> String {
        "0.0.0.0:17070".to_string()
    }

    fn default_data_dir() -> String {
        "/var/lib/fleetd".to_string()
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            substrate: Substrate::Manual,
            admin_password: None,
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:17070");
        assert_eq!(config.data_dir, "/var/lib/fleetd");
        assert_eq!(config.substrate, Substrate::Manual);
        assert!(config.admin_password.is_none());
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }
}
