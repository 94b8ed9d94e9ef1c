pub mod batch_request;
pub mod config;
pub mod constants;
pub mod coords;
pub mod presets;
pub mod sim;
pub mod sim_loop;
pub mod stats;

pub use batch_request::{BatchRequest, Frame};
pub use config::{PhysicsConfig, SimulationConfig};
pub use coords::{Coords, MassPoint};
pub use sim::{
    Body, ElapsedTime, ForceSample, Universe,
    barnes_hut::{BarnesHutTree, BodyId, BranchId, NodeId, Region, StepReport},
};
pub use sim_loop::{LoopSummary, run_sim_loop};
pub use stats::BodyStats;
