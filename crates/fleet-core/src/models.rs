//! Core data models for the fleet simulator.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Live state of one simulated vehicle.
///
/// Owned exclusively by that vehicle's actor; nothing else mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    pub speed_mps: f64,
    pub battery_pct: f64,
    pub status: VehicleStatus,
    pub heading_deg: f64,
}

impl VehicleState {
    /// Fresh state at a resting position: full battery, idle, heading north.
    pub fn at(lat: f64, lon: f64, alt_m: f64) -> Self {
        Self {
            lat,
            lon,
            alt_m,
            speed_mps: 0.0,
            battery_pct: 100.0,
            status: VehicleStatus::Idle,
            heading_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    /// On the ground or hovering with nothing to do
    #[default]
    Idle,
    /// Airborne; pursuing a waypoint if one is set
    Flying,
    /// Touching down; settles to Idle on the next tick
    Landing,
    /// Reserved for fault reporting; no transition currently produces it
    Error,
}

/// Geographic target the actor is currently steering toward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

/// Immutable per-session vehicle configuration handed over by the external
/// registry. The core only reads it; it is never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleDefinition {
    pub id: String,
    pub topic_prefix: String,
    pub start_lat: f64,
    pub start_lon: f64,
    pub start_alt: f64,
    pub publish_interval_sec: f64,
    pub cruise_speed_mps: f64,
    pub battery_drain: f64,
    pub heading_noise: f64,
}

impl VehicleDefinition {
    /// State a newly constructed actor starts from.
    pub fn initial_state(&self) -> VehicleState {
        VehicleState::at(self.start_lat, self.start_lon, self.start_alt)
    }

    /// Home position targeted by the `rth` command.
    pub fn home(&self) -> Waypoint {
        Waypoint {
            lat: self.start_lat,
            lon: self.start_lon,
        }
    }
}

/// Telemetry snapshot published once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub drone_id: String,
    pub ts: f64,
    pub position: Position,
    pub speed_mps: f64,
    pub battery_pct: f64,
    pub status: VehicleStatus,
    pub heading_deg: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

/// Out-of-band lifecycle signals on the events topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Status { message: String, ts: f64 },
    Pong { ts: f64 },
}

impl Event {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
            ts: current_timestamp(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            ts: current_timestamp(),
        }
    }
}

/// Seconds since the Unix epoch, as used in the telemetry/event wire format.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
