use std::time::Duration;

use anyhow::{Context, Result};
use dotenv::dotenv;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct AppConfig {
    pub listen_addr: String,
    pub backend_addr: String,
    pub jwt_secret: Option<String>,
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn optional_secs(name: &str) -> Result<Option<Duration>> {
    optional_var(name)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("Invalid {} value: {}", name, v))
        })
        .transpose()
}

pub fn load_config() -> Result<AppConfig> {
    dotenv().ok();

    let listen_addr =
        optional_var("GATE_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let backend_addr = optional_var("GATE_BACKEND_ADDR")
        .context("GATE_BACKEND_ADDR environment variable is not set")?;

    Ok(AppConfig {
        listen_addr,
        backend_addr,
        jwt_secret: optional_var("GATE_JWT_SECRET"),
        request_timeout: optional_secs("GATE_REQUEST_TIMEOUT_SECS")?,
        connect_timeout: optional_secs("GATE_CONNECT_TIMEOUT_SECS")?,
    })
}
