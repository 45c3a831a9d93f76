mod cnfg;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ws_gate::{ForwardingProxy, ProxyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = cnfg::load_config()?;

    match &config.jwt_secret {
        Some(secret) => ws_gate::set_secret(secret.as_bytes()),
        None => tracing::warn!("GATE_JWT_SECRET not set, token signatures will not be verified"),
    }

    let proxy = ForwardingProxy::new(config.backend_addr.clone()).with_config(ProxyConfig {
        request_timeout: config.request_timeout,
        connect_timeout: config.connect_timeout,
    });
    proxy.start(&config.listen_addr).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    proxy.stop().await?;

    Ok(())
}
