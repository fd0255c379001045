//! Standalone single-vehicle agent.
//!
//! Runs one simulated drone over the in-process broker and mirrors its
//! telemetry and events into the log. The actor and supervisor here are
//! the same ones a fleet deployment composes with a real broker transport.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_agent::config::AgentConfig;
use fleet_agent::transport::{LocalBroker, Transport};
use fleet_agent::FleetSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleet_agent=debug".parse()?),
        )
        .init();

    let config = AgentConfig::from_env();
    let definition = config.definition();
    tracing::info!(
        "Starting agent for {} at ({}, {})",
        definition.id,
        definition.start_lat,
        definition.start_lon
    );

    let broker = Arc::new(LocalBroker::new());
    let supervisor = FleetSupervisor::new(broker.clone(), config.shared_secret.clone());

    let base = format!("{}/drone/{}", definition.topic_prefix, definition.id);
    let telemetry = broker.subscribe(&format!("{}/telemetry", base)).await?;
    let events = broker.subscribe(&format!("{}/events", base)).await?;
    tokio::spawn(mirror("telemetry", telemetry));
    tokio::spawn(mirror("event", events));

    supervisor.start(definition.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    supervisor.stop(&definition.id).await;

    Ok(())
}

/// Log every frame seen on a topic.
async fn mirror(label: &'static str, mut frames: fleet_agent::transport::Subscription) {
    while let Some(frame) = frames.recv().await {
        match std::str::from_utf8(&frame) {
            Ok(text) => tracing::info!("{}: {}", label, text),
            Err(_) => tracing::warn!("{}: {} non-UTF8 bytes", label, frame.len()),
        }
    }
}
