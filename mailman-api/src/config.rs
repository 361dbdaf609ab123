//! Configuration module for environment variable parsing.
//!
//! Every setting has a default suited to a Mailman host serving the API on
//! localhost only.

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub bind_address: IpAddr,

    /// Port for the web server to listen on
    pub port: u16,

    /// Peer addresses allowed to use the API
    pub allowed_ips: Vec<IpAddr>,

    /// Directory holding one JSON record per mailing list
    pub lists_dir: PathBuf,

    /// Inbound queue directory that injected posts are written to
    pub inqueue_dir: PathBuf,

    /// Optional path to a message template replacing the built-in one
    pub message_template: Option<PathBuf>,

    /// Domain for list posting addresses not set in the list record
    pub default_domain: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            bind_address: env::var("BIND_ADDRESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1])),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),

            allowed_ips: parse_ip_list("ALLOWED_IPS")
                .unwrap_or_else(|| vec![IpAddr::from([127, 0, 0, 1])]),

            lists_dir: env::var("MAILMAN_LISTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/mailman/lists")),

            inqueue_dir: env::var("MAILMAN_INQUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/mailman/qfiles/in")),

            message_template: env::var("MESSAGE_TEMPLATE").ok().map(PathBuf::from),

            default_domain: env::var("MAILMAN_DEFAULT_DOMAIN")
                .unwrap_or_else(|_| "localhost".to_string()),
        }
    }
}

/// Parse a comma-separated list of IP addresses, skipping invalid entries.
fn parse_ip_list(name: &str) -> Option<Vec<IpAddr>> {
    let entries = parse_csv(name)?;

    let ips = entries
        .iter()
        .filter_map(|entry| match entry.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!(env_var = name, value = %entry, "Invalid IP address, skipping");
                None
            }
        })
        .collect();

    Some(ips)
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
