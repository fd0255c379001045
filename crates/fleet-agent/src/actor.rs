//! Per-vehicle simulation actor.
//!
//! One actor exclusively owns one vehicle's state. Command intake and the
//! simulation tick are arms of the same `select!` loop on one task, so the
//! two can never race on the state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use fleet_core::envelope::{self, CommandPayload};
use fleet_core::kinematics::{self, Dynamics};
use fleet_core::models::{
    current_timestamp, Event, Position, Telemetry, VehicleDefinition, VehicleState, VehicleStatus,
    Waypoint,
};

use crate::transport::{with_deadline, Qos, Transport, TRANSPORT_DEADLINE};

/// Per-axis arrival tolerance in degrees.
const ARRIVAL_EPSILON_DEG: f64 = 1e-5;

/// Altitude taken by `takeoff` when the command carries none.
const DEFAULT_TAKEOFF_ALT_M: f64 = 10.0;

/// Topic names for one vehicle.
#[derive(Debug, Clone)]
pub struct TopicSet {
    pub telemetry: String,
    pub events: String,
    pub commands: String,
}

impl TopicSet {
    pub fn for_vehicle(prefix: &str, id: &str) -> Self {
        let base = format!("{}/drone/{}", prefix, id);
        Self {
            telemetry: format!("{}/telemetry", base),
            events: format!("{}/events", base),
            commands: format!("{}/commands", base),
        }
    }
}

/// Simulation actor for a single vehicle.
pub struct VehicleActor {
    definition: VehicleDefinition,
    secret: String,
    transport: Arc<dyn Transport>,
    topics: TopicSet,
    state: VehicleState,
    waypoint: Option<Waypoint>,
}

impl VehicleActor {
    pub fn new(
        definition: VehicleDefinition,
        secret: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let topics = TopicSet::for_vehicle(&definition.topic_prefix, &definition.id);
        let state = definition.initial_state();
        Self {
            definition,
            secret: secret.into(),
            transport,
            topics,
            state,
            waypoint: None,
        }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Drive the simulation until `shutdown` fires or the command stream
    /// closes. Consumes the actor; state dies with the loop.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let subscribe = self.transport.subscribe(&self.topics.commands);
        let mut commands = match with_deadline(TRANSPORT_DEADLINE, subscribe).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!("{}: command subscribe failed: {}", self.definition.id, err);
                return;
            }
        };

        // One-time lifecycle signal after the first successful transport
        // interaction. Not repeated on reconnects.
        self.publish_json(&self.topics.events, &Event::status("connected"), Qos::AtLeastOnce)
            .await;

        let mut ticker = interval(Duration::from_secs_f64(self.definition.publish_interval_sec));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                frame = commands.recv() => match frame {
                    Some(bytes) => self.handle_frame(&bytes).await,
                    None => {
                        tracing::warn!("{}: command stream closed", self.definition.id);
                        break;
                    }
                },
                _ = ticker.tick() => self.tick().await,
            }
        }

        tracing::info!("{}: actor stopped", self.definition.id);
    }

    /// Decode, authenticate and apply one raw command frame. Frames that
    /// fail any check are dropped with a local log line and no reply.
    async fn handle_frame(&mut self, frame: &[u8]) {
        let payload = match envelope::open(frame, &self.secret) {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::warn!("{}: dropping command frame: {}", self.definition.id, reason);
                return;
            }
        };

        tracing::debug!("{}: command {}", self.definition.id, payload.cmd);
        if let Some(event) = self.apply(payload) {
            self.publish_json(&self.topics.events, &event, Qos::AtMostOnce)
                .await;
        }
    }

    /// Apply a verified command to the state machine. Returns an event to
    /// publish when the command calls for one.
    fn apply(&mut self, payload: CommandPayload) -> Option<Event> {
        let args = payload.args;
        match payload.cmd.as_str() {
            "takeoff" => {
                self.state.status = VehicleStatus::Flying;
                let alt = number_arg(&args, "alt").unwrap_or(DEFAULT_TAKEOFF_ALT_M);
                self.state.alt_m = self.state.alt_m.max(alt);
                None
            }
            "land" => {
                self.state.status = VehicleStatus::Landing;
                self.state.alt_m = 0.0;
                self.state.speed_mps = 0.0;
                self.waypoint = None;
                None
            }
            "goto" => {
                let (Some(lat), Some(lon)) =
                    (number_arg(&args, "lat"), number_arg(&args, "lon"))
                else {
                    tracing::warn!(
                        "{}: goto without numeric lat/lon, ignoring",
                        self.definition.id
                    );
                    return None;
                };
                self.waypoint = Some(Waypoint { lat, lon });
                self.state.status = VehicleStatus::Flying;
                if let Some(alt) = number_arg(&args, "alt") {
                    self.state.alt_m = alt;
                }
                None
            }
            "rth" => {
                // Home is the configured start position, kept for the whole
                // session.
                self.waypoint = Some(self.definition.home());
                self.state.status = VehicleStatus::Flying;
                None
            }
            "ping" => Some(Event::pong()),
            other => {
                tracing::warn!("{}: unknown command {:?}, ignoring", self.definition.id, other);
                None
            }
        }
    }

    /// One simulation step: advance toward the waypoint if flying, publish
    /// a telemetry snapshot, settle Landing into Idle.
    async fn tick(&mut self) {
        if self.state.status == VehicleStatus::Flying {
            if let Some(target) = self.waypoint {
                let dynamics = self.dynamics();
                kinematics::move_towards(
                    &mut self.state,
                    target,
                    self.definition.publish_interval_sec,
                    &dynamics,
                );
                if (self.state.lat - target.lat).abs() < ARRIVAL_EPSILON_DEG
                    && (self.state.lon - target.lon).abs() < ARRIVAL_EPSILON_DEG
                {
                    self.waypoint = None;
                    self.state.status = VehicleStatus::Idle;
                    self.state.speed_mps = 0.0;
                }
            }
        }

        let snapshot = self.snapshot();
        self.publish_json(&self.topics.telemetry, &snapshot, Qos::AtMostOnce)
            .await;

        if self.state.status == VehicleStatus::Landing {
            self.state.status = VehicleStatus::Idle;
        }
    }

    fn snapshot(&self) -> Telemetry {
        Telemetry {
            drone_id: self.definition.id.clone(),
            ts: current_timestamp(),
            position: Position {
                lat: self.state.lat,
                lon: self.state.lon,
                alt: self.state.alt_m,
            },
            speed_mps: self.state.speed_mps,
            battery_pct: self.state.battery_pct,
            status: self.state.status,
            heading_deg: self.state.heading_deg,
        }
    }

    fn dynamics(&self) -> Dynamics {
        Dynamics {
            cruise_speed_mps: self.definition.cruise_speed_mps,
            battery_drain: self.definition.battery_drain,
            heading_noise_deg: self.definition.heading_noise,
        }
    }

    /// Serialize and publish, bounded by the transport deadline. A failed
    /// publish costs this frame only; the loop carries on.
    async fn publish_json<T: Serialize>(&self, topic: &str, value: &T, qos: Qos) {
        let frame = match serde_json::to_vec(value) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!("{}: serialize for {} failed: {}", self.definition.id, topic, err);
                return;
            }
        };
        let publish = self.transport.publish(topic, frame, qos);
        if let Err(err) = with_deadline(TRANSPORT_DEADLINE, publish).await {
            tracing::warn!("{}: publish to {} failed: {}", self.definition.id, topic, err);
        }
    }
}

fn number_arg(args: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<f64> {
    args.get(key).and_then(serde_json::Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalBroker;
    use serde_json::json;

    fn definition() -> VehicleDefinition {
        VehicleDefinition {
            id: "drone-001".to_string(),
            topic_prefix: "lab".to_string(),
            start_lat: 48.8566,
            start_lon: 2.3522,
            start_alt: 0.0,
            publish_interval_sec: 1.0,
            cruise_speed_mps: 8.0,
            battery_drain: 0.005,
            heading_noise: 0.0,
        }
    }

    fn actor() -> VehicleActor {
        VehicleActor::new(definition(), "secret", Arc::new(LocalBroker::new()))
    }

    fn command(cmd: &str, args: serde_json::Value) -> CommandPayload {
        serde_json::from_value(json!({"cmd": cmd, "args": args})).unwrap()
    }

    #[test]
    fn topics_follow_the_prefix_scheme() {
        let topics = TopicSet::for_vehicle("lab", "drone-001");
        assert_eq!(topics.telemetry, "lab/drone/drone-001/telemetry");
        assert_eq!(topics.events, "lab/drone/drone-001/events");
        assert_eq!(topics.commands, "lab/drone/drone-001/commands");
    }

    #[test]
    fn takeoff_raises_to_the_requested_altitude() {
        let mut actor = actor();
        actor.apply(command("takeoff", json!({"alt": 25.0})));
        assert_eq!(actor.state.status, VehicleStatus::Flying);
        assert_eq!(actor.state.alt_m, 25.0);

        // Never descends: a lower requested altitude keeps the current one.
        actor.apply(command("takeoff", json!({"alt": 5.0})));
        assert_eq!(actor.state.alt_m, 25.0);
    }

    #[test]
    fn takeoff_defaults_to_ten_meters() {
        let mut actor = actor();
        actor.apply(command("takeoff", json!({})));
        assert_eq!(actor.state.alt_m, DEFAULT_TAKEOFF_ALT_M);
    }

    #[test]
    fn land_zeroes_altitude_and_clears_the_waypoint() {
        let mut actor = actor();
        actor.apply(command("goto", json!({"lat": 48.9, "lon": 2.4, "alt": 30.0})));
        assert!(actor.waypoint.is_some());

        actor.apply(command("land", json!({})));
        assert_eq!(actor.state.status, VehicleStatus::Landing);
        assert_eq!(actor.state.alt_m, 0.0);
        assert_eq!(actor.state.speed_mps, 0.0);
        assert!(actor.waypoint.is_none());
    }

    #[test]
    fn goto_sets_waypoint_status_and_altitude() {
        let mut actor = actor();
        actor.apply(command("goto", json!({"lat": 48.9, "lon": 2.4, "alt": 30.0})));
        assert_eq!(
            actor.waypoint,
            Some(Waypoint { lat: 48.9, lon: 2.4 })
        );
        assert_eq!(actor.state.status, VehicleStatus::Flying);
        assert_eq!(actor.state.alt_m, 30.0);
    }

    #[test]
    fn goto_without_altitude_keeps_the_current_one() {
        let mut actor = actor();
        actor.apply(command("takeoff", json!({"alt": 12.0})));
        actor.apply(command("goto", json!({"lat": 48.9, "lon": 2.4})));
        assert_eq!(actor.state.alt_m, 12.0);
    }

    #[test]
    fn goto_with_missing_or_non_numeric_coordinates_is_dropped() {
        let mut actor = actor();
        actor.apply(command("goto", json!({"lat": 48.9})));
        actor.apply(command("goto", json!({"lat": "north", "lon": "east"})));
        assert!(actor.waypoint.is_none());
        assert_eq!(actor.state.status, VehicleStatus::Idle);
    }

    #[test]
    fn rth_targets_the_configured_start_position() {
        let mut actor = actor();
        actor.apply(command("goto", json!({"lat": 48.9, "lon": 2.4})));
        actor.apply(command("rth", json!({})));
        assert_eq!(
            actor.waypoint,
            Some(Waypoint { lat: 48.8566, lon: 2.3522 })
        );
        assert_eq!(actor.state.status, VehicleStatus::Flying);
    }

    #[test]
    fn ping_yields_a_pong_event() {
        let mut actor = actor();
        let event = actor.apply(command("ping", json!({})));
        assert!(matches!(event, Some(Event::Pong { .. })));
        assert_eq!(actor.state.status, VehicleStatus::Idle);
    }

    #[test]
    fn unknown_commands_change_nothing() {
        let mut actor = actor();
        let event = actor.apply(command("self_destruct", json!({})));
        assert!(event.is_none());
        assert_eq!(actor.state.status, VehicleStatus::Idle);
        assert!(actor.waypoint.is_none());
    }

    #[tokio::test]
    async fn unauthenticated_frames_never_touch_the_state() {
        let mut actor = actor();

        actor.handle_frame(b"{ not json").await;

        let envelope = fleet_core::envelope::CommandEnvelope::seal(
            json!({"cmd": "goto", "args": {"lat": 48.9, "lon": 2.4}}),
            "wrong-secret",
        );
        actor
            .handle_frame(&serde_json::to_vec(&envelope).unwrap())
            .await;

        assert_eq!(actor.state.status, VehicleStatus::Idle);
        assert!(actor.waypoint.is_none());
    }

    #[tokio::test]
    async fn landing_settles_to_idle_after_one_snapshot() {
        let mut actor = actor();
        actor.apply(command("land", json!({})));
        assert_eq!(actor.state.status, VehicleStatus::Landing);

        actor.tick().await;
        assert_eq!(actor.state.status, VehicleStatus::Idle);
    }

    #[tokio::test]
    async fn arrival_clears_the_waypoint_and_goes_idle() {
        let mut actor = actor();
        // A target one step away at cruise speed.
        let lat = 48.8566 + 5.0 / fleet_core::kinematics::METERS_PER_DEG;
        actor.apply(command("goto", json!({"lat": lat, "lon": 2.3522})));

        actor.tick().await;

        assert!(actor.waypoint.is_none());
        assert_eq!(actor.state.status, VehicleStatus::Idle);
        assert_eq!(actor.state.speed_mps, 0.0);
        assert!((actor.state.lat - lat).abs() < ARRIVAL_EPSILON_DEG);
    }
}
