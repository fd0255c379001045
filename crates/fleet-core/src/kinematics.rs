//! Flat-earth kinematics for the simulation step.
//!
//! Distances are computed in degree-space and the metric step is converted
//! with an equator-scale constant. Good enough for a sandbox fleet; not a
//! navigation model.

use rand::Rng;

use crate::models::{VehicleState, Waypoint};

/// Meters per degree of latitude at the equator.
pub const METERS_PER_DEG: f64 = 111_000.0;

/// Degree-space distance below which the vehicle counts as already there.
pub const AT_TARGET_EPSILON: f64 = 1e-6;

/// Movement characteristics of one vehicle, taken from its definition.
#[derive(Debug, Clone, Copy)]
pub struct Dynamics {
    pub cruise_speed_mps: f64,
    pub battery_drain: f64,
    pub heading_noise_deg: f64,
}

/// Advance `state` one step of `dt` seconds toward `target`.
///
/// Already at the target (distance below [`AT_TARGET_EPSILON`]) leaves the
/// position and heading unchanged and zeroes the speed. If a full step
/// overshoots, the position snaps exactly onto the target. Battery drains
/// proportionally to speed and elapsed time, floored at zero.
///
/// Inputs are pre-validated by the caller: `dt > 0`, speeds and factors
/// non-negative.
pub fn move_towards(state: &mut VehicleState, target: Waypoint, dt: f64, dynamics: &Dynamics) {
    let dlat = target.lat - state.lat;
    let dlon = target.lon - state.lon;
    let dist = dlat.hypot(dlon);
    if dist < AT_TARGET_EPSILON {
        state.speed_mps = 0.0;
        return;
    }

    let step = dynamics.cruise_speed_mps * dt / METERS_PER_DEG;
    if step >= dist {
        state.lat = target.lat;
        state.lon = target.lon;
        state.speed_mps = 0.0;
    } else {
        state.lat += dlat / dist * step;
        state.lon += dlon / dist * step;
        state.speed_mps = dynamics.cruise_speed_mps;
    }

    let mut heading = (dlon.atan2(dlat).to_degrees() + 360.0).rem_euclid(360.0);
    if dynamics.heading_noise_deg > 0.0 {
        let noise = rand::rng()
            .random_range(-dynamics.heading_noise_deg..=dynamics.heading_noise_deg);
        heading = (heading + noise).rem_euclid(360.0);
    }
    state.heading_deg = heading;

    state.battery_pct =
        (state.battery_pct - dynamics.battery_drain * dynamics.cruise_speed_mps * dt).max(0.0);
}
