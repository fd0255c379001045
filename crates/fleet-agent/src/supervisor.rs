//! Fleet supervisor.
//!
//! Owns the registry of running actors and guarantees at most one live
//! actor per vehicle id. Also signs outbound commands, so callers (an HTTP
//! layer, tooling) never handle the shared secret themselves.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use fleet_core::envelope::CommandEnvelope;
use fleet_core::models::VehicleDefinition;

use crate::actor::VehicleActor;
use crate::transport::{with_deadline, Qos, Transport, TRANSPORT_DEADLINE};

/// How long `stop` waits for an actor's loop to exit.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Result of a [`FleetSupervisor::stop`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop exited within the grace period.
    Stopped,
    /// Shutdown was signalled but the loop had not exited in time. The
    /// registry entry is removed anyway; the task drains on its own.
    TimedOut,
    /// No actor was registered under the id.
    NotFound,
}

/// Registry slot for one vehicle id.
struct ActorHandle {
    shutdown: broadcast::Sender<()>,
    /// Actor waiting for `start`; taken exactly once.
    pending: Mutex<Option<VehicleActor>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ActorHandle {
    fn new(actor: VehicleActor) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shutdown,
            pending: Mutex::new(Some(actor)),
            join: Mutex::new(None),
        }
    }

    /// Spawn the actor loop unless it was spawned before.
    fn start(&self) {
        let actor = match self.pending.lock() {
            Ok(mut pending) => pending.take(),
            Err(_) => None,
        };
        let Some(actor) = actor else {
            return;
        };
        let handle = tokio::spawn(actor.run(self.shutdown.subscribe()));
        if let Ok(mut join) = self.join.lock() {
            *join = Some(handle);
        }
    }

    /// The loop was spawned and has not exited.
    fn is_running(&self) -> bool {
        self.join
            .lock()
            .map(|join| join.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Running, or registered and still waiting for `start`.
    fn is_live(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false);
        pending || self.is_running()
    }
}

/// Registry of simulation actors, one per vehicle id.
pub struct FleetSupervisor {
    transport: Arc<dyn Transport>,
    secret: String,
    actors: DashMap<String, ActorHandle>,
}

impl FleetSupervisor {
    pub fn new(transport: Arc<dyn Transport>, secret: impl Into<String>) -> Self {
        Self {
            transport,
            secret: secret.into(),
            actors: DashMap::new(),
        }
    }

    fn build_handle(&self, definition: VehicleDefinition) -> ActorHandle {
        ActorHandle::new(VehicleActor::new(
            definition,
            self.secret.clone(),
            self.transport.clone(),
        ))
    }

    /// Register an actor for `definition` without starting it.
    ///
    /// Idempotent: a live actor under the same id is left untouched, even
    /// if the definition changed. Only an exited actor is replaced.
    pub fn ensure_actor(&self, definition: VehicleDefinition) {
        match self.actors.entry(definition.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live() {
                    occupied.insert(self.build_handle(definition));
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.build_handle(definition));
            }
        }
    }

    /// Ensure an actor for `definition` and start its loop.
    ///
    /// Starting an already running id is a no-op. The registry's per-key
    /// entry lock makes concurrent calls for one id mutually exclusive, so
    /// two racing `start`s still produce exactly one live actor.
    pub fn start(&self, definition: VehicleDefinition) {
        match self.actors.entry(definition.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live() {
                    occupied.insert(self.build_handle(definition));
                }
                occupied.get().start();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.build_handle(definition)).start();
            }
        }
    }

    /// True iff a registered actor's loop is currently executing.
    pub fn is_running(&self, id: &str) -> bool {
        self.actors
            .get(id)
            .map(|handle| handle.is_running())
            .unwrap_or(false)
    }

    /// Signal the actor for `id` to stop and wait up to the grace period
    /// for its loop to exit. The registry entry is removed in every case;
    /// a timeout is a soft outcome, not an error.
    pub async fn stop(&self, id: &str) -> StopOutcome {
        let Some((_, handle)) = self.actors.remove(id) else {
            return StopOutcome::NotFound;
        };

        let _ = handle.shutdown.send(());
        let join = match handle.join.lock() {
            Ok(mut join) => join.take(),
            Err(_) => None,
        };
        let Some(join) = join else {
            // Registered but never started; nothing to wait for.
            return StopOutcome::Stopped;
        };

        match tokio::time::timeout(STOP_GRACE, join).await {
            Ok(result) => {
                if let Err(err) = result {
                    tracing::warn!("{}: actor task ended abnormally: {}", id, err);
                }
                StopOutcome::Stopped
            }
            Err(_) => {
                tracing::warn!(
                    "{}: actor did not stop within {:?}, detaching",
                    id,
                    STOP_GRACE
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Seal `payload` with the fleet secret and publish it on the
    /// vehicle's command topic. Returns the topic and the envelope.
    pub async fn publish_command(
        &self,
        topic_prefix: &str,
        id: &str,
        payload: Value,
    ) -> Result<(String, CommandEnvelope)> {
        let envelope = CommandEnvelope::seal(payload, &self.secret);
        let topic = format!("{}/drone/{}/commands", topic_prefix, id);
        let frame = serde_json::to_vec(&envelope)?;

        with_deadline(
            TRANSPORT_DEADLINE,
            self.transport.publish(&topic, frame, Qos::AtMostOnce),
        )
        .await?;

        Ok((topic, envelope))
    }
}
