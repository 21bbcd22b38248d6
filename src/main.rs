use anyhow::Result;
use power_forecast::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    if let Some(tibber) = &cfg.providers.tibber {
        if tibber.token == "CHANGE_ME" {
            anyhow::bail!(
                "Tibber token is still the placeholder. Set POWER_FORECAST__PROVIDERS__TIBBER__TOKEN \
                to the access token from developer.tibber.com"
            );
        }
    }

    let app_state = controller::AppState::new(cfg.clone())?;
    let app = api::router(app_state.clone());

    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!(
            "WARNING: Server binding to 0.0.0.0 - service will be accessible from network! \
            For production, bind to 127.0.0.1 unless behind a firewall/reverse proxy."
        );
    }

    info!(%addr, peak_sensors = cfg.sensors.peak.len(), "starting power forecast service");

    let refresh = controller::spawn_refresh_loop(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    refresh.abort();
    warn!("shutdown complete");
    Ok(())
}
