use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of live lobbies
    pub max_lobbies: usize,
    /// Port for the metrics endpoint
    pub metrics_port: u16,
    /// Push `lobbyList` to every connection on each lobby change
    pub announce_lobby_list: bool,
    /// Per-connection message rate limit
    pub max_messages_per_second: u32,
    /// Global connection cap
    pub max_connections: usize,
    /// Path to TLS certificate file (falls back to certs/)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (falls back to certs/)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            max_lobbies: 100,
            metrics_port: 9090,
            announce_lobby_list: true,
            max_messages_per_second: 120,
            max_connections: 1000,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

/// Parse `raw` into `T` if it satisfies `valid`, warning otherwise
fn parse_checked<T: FromStr>(key: &str, raw: &str, valid: impl Fn(&T) -> bool, rule: &str) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(parsed) if valid(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", key, rule);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load config from any key lookup (environment in production)
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDRESS") {
            if let Some(parsed) = parse_checked("BIND_ADDRESS", &addr, |_: &IpAddr| true, "an IP address") {
                config.bind_address = parsed;
            }
        }

        if let Some(port) = lookup("PORT") {
            if let Some(parsed) = parse_checked("PORT", &port, |p: &u16| *p > 0, "> 0") {
                config.port = parsed;
            }
        }

        if let Some(max) = lookup("MAX_LOBBIES") {
            if let Some(parsed) =
                parse_checked("MAX_LOBBIES", &max, |n: &usize| (1..=10000).contains(n), "1-10000")
            {
                config.max_lobbies = parsed;
            }
        }

        if let Some(port) = lookup("METRICS_PORT") {
            if let Some(parsed) = parse_checked("METRICS_PORT", &port, |p: &u16| *p > 0, "> 0") {
                config.metrics_port = parsed;
            }
        }

        if let Some(flag) = lookup("ANNOUNCE_LOBBY_LIST") {
            match parse_bool(&flag) {
                Some(enabled) => config.announce_lobby_list = enabled,
                None => tracing::warn!("Invalid ANNOUNCE_LOBBY_LIST '{}', using default", flag),
            }
        }

        if let Some(rate) = lookup("MAX_MESSAGES_PER_SECOND") {
            if let Some(parsed) =
                parse_checked("MAX_MESSAGES_PER_SECOND", &rate, |n: &u32| *n > 0, "> 0")
            {
                config.max_messages_per_second = parsed;
            }
        }

        if let Some(max) = lookup("MAX_CONNECTIONS") {
            if let Some(parsed) = parse_checked("MAX_CONNECTIONS", &max, |n: &usize| *n > 0, "> 0") {
                config.max_connections = parsed;
            }
        }

        config.tls_cert_path = lookup("TLS_CERT_PATH");
        config.tls_key_path = lookup("TLS_KEY_PATH");

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_lobbies == 0 {
            return Err("max_lobbies must be at least 1".to_string());
        }
        if self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }
}
