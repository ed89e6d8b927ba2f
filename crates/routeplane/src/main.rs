//! Routeplane - Main entry point
//!
//! Loads configuration, brings up the engine and control channel, installs
//! the bootstrap topology and serves the admin API until termination.

use std::sync::Arc;

use anyhow::{Context, Result};

use routeplane::api::{self, AppState};
use routeplane::bootstrap::Bootstrapper;
use routeplane::config::{AppConfig, ConfigurationLoader};
use routeplane::control::{ChannelSettings, ControlChannel, TerminationChannel};
use routeplane::engine::registry::Registry;
use routeplane::engine::{ManagedEngine, RoutingEngine};
use routeplane::environment;
use routeplane::runtime::actor::run_blocking;
use routeplane::telemetry::TraceSettings;
use routeplane::topology::RouteConfigurator;

#[tokio::main]
async fn main() -> Result<()> {
    let app = AppConfig::from_env();

    let config = ConfigurationLoader::new(app.config_path.clone())
        .load()
        .with_context(|| format!("Failed to load configuration from {:?}", app.config_path))?;
    let config = Arc::new(config);

    TraceSettings::from_config(&config)
        .context("Invalid trace configuration")?
        .init()?;

    tracing::info!("Starting Routeplane");
    tracing::info!("Configuration loaded: {:?}", app);

    let registry = Arc::new(Registry::new());
    let engine = Arc::new(RoutingEngine::new(Arc::clone(&registry)));
    let configurator = RouteConfigurator::new(Arc::clone(&config), registry.clone())
        .context("Failed to create route configurator")?;
    tracing::info!(policy = %configurator.reset_policy(), "Topology session ready");

    let termination = TerminationChannel::new();
    let channel = ControlChannel::spawn(
        engine.clone(),
        configurator.clone(),
        termination.clone(),
        ChannelSettings {
            buffer: app.control_buffer,
            eval_timeout: app.eval_timeout(),
        },
    )?;

    let processor_key = config.get(environment::DEFAULT_PROCESSOR)?;
    registry.register_processor(processor_key, channel.processor());

    Bootstrapper::new(Arc::clone(&config), configurator)
        .bootstrap(&channel)
        .await?;
    channel.activate()?;

    let admin_addr = format!("0.0.0.0:{}", app.admin_port);
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr)
        .await
        .with_context(|| format!("Failed to bind admin API on {}", admin_addr))?;
    tracing::info!("Admin API listening on {}", admin_addr);

    let router = api::admin_router(Arc::new(AppState {
        channel: channel.clone(),
        engine: engine.clone(),
    }));
    let admin_handle = tokio::spawn(async move { axum::serve(admin_listener, router).await });

    tokio::select! {
        _ = termination.wait() => tracing::info!("Termination signal received"),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            tracing::info!("Interrupted, shutting down");
        }
        res = admin_handle => tracing::error!("Admin server exited: {:?}", res),
    }

    let stopping = Arc::clone(&engine);
    match run_blocking(app.shutdown_grace(), move || stopping.stop()).await {
        Ok(Ok(())) => tracing::info!("Engine stopped"),
        Ok(Err(e)) => tracing::error!("Engine failed to stop: {}", e),
        Err(e) => tracing::error!("Engine did not stop within grace period: {}", e),
    }

    Ok(())
}
