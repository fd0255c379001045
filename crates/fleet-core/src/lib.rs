pub mod envelope;
pub mod kinematics;
pub mod models;

pub use envelope::{sign, verify, CommandEnvelope, CommandPayload};
pub use kinematics::{move_towards, Dynamics};
pub use models::{
    Event, Position, Telemetry, VehicleDefinition, VehicleState, VehicleStatus, Waypoint,
};
