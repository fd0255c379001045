//! Fleet agent - vehicle simulation actors over a pub/sub transport.
//!
//! One [`actor::VehicleActor`] per vehicle owns that vehicle's state and
//! runs its tick loop; the [`supervisor::FleetSupervisor`] keeps at most one
//! live actor per vehicle id. Both the standalone agent binary and
//! fleet-managed deployments compose the same actor.

pub mod actor;
pub mod config;
pub mod supervisor;
pub mod transport;

pub use actor::{TopicSet, VehicleActor};
pub use supervisor::{FleetSupervisor, StopOutcome};
pub use transport::{LocalBroker, Qos, Transport, TransportError};
