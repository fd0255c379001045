//! Standalone agent configuration from environment.

use std::env;

use fleet_core::models::VehicleDefinition;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub drone_id: String,
    pub topic_prefix: String,
    pub shared_secret: String,
    pub publish_interval_sec: f64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub start_alt: f64,
    pub cruise_speed_mps: f64,
    pub battery_drain: f64,
    pub heading_noise: f64,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self {
            drone_id: env_str("DRONE_ID", "drone-001"),
            topic_prefix: env_str("TOPIC_PREFIX", "lab"),
            shared_secret: env_str("SHARED_SECRET", "dev-secret-change-me"),
            publish_interval_sec: env_f64("PUBLISH_INTERVAL_SEC", 1.0),
            start_lat: env_f64("START_LAT", 48.8566),
            start_lon: env_f64("START_LON", 2.3522),
            start_alt: env_f64("START_ALT", 0.0),
            cruise_speed_mps: env_f64("CRUISE_SPEED_MPS", 8.0),
            battery_drain: env_f64("BATTERY_DRAIN", 0.005),
            heading_noise: env_f64("HEADING_NOISE", 0.0),
        }
    }

    /// Vehicle definition for the single simulated drone.
    pub fn definition(&self) -> VehicleDefinition {
        VehicleDefinition {
            id: self.drone_id.clone(),
            topic_prefix: self.topic_prefix.clone(),
            start_lat: self.start_lat,
            start_lon: self.start_lon,
            start_alt: self.start_alt,
            publish_interval_sec: self.publish_interval_sec,
            cruise_speed_mps: self.cruise_speed_mps,
            battery_drain: self.battery_drain,
            heading_noise: self.heading_noise,
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
