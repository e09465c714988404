//! loadgen library: Exposes the native pieces of the workload generator for
//! testing.
//!
//! This is a thin layer over loadgen-core that adds the tokio filesystem, the
//! loopback replica peer, and the simulation pipeline.

pub mod native_fs;
pub mod peer;
pub mod simulation;

pub use native_fs::NativeFs;
pub use peer::LoopbackPeer;
pub use simulation::{Simulation, SimulationConfig};
