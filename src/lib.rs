//! Ember Engine - interactive particle sandbox simulation
//!
//! Architecture, one module per concern:
//! - config.rs      - size configuration and derived grid constants
//! - plane.rs       - 2D storage for every field grid
//! - parts.rs       - particle records, pool, pmap tag packing
//! - elements/      - element registry and per-family behaviors
//! - air.rs         - pressure/velocity/ambient-heat solver
//! - gravity.rs     - Newtonian gravity solver thread
//! - simulation.rs  - simulation state and pool primitives
//! - movement.rs    - swept motion, collisions, refraction
//! - transitions.rs - heat conduction and state transitions
//! - update.rs      - per-tick pipeline
//! - editing.rs     - brushes, floods, walls, decoration
//! - save.rs        - bit-packed save codec
//! - snapshot.rs    - snapshots and deltas
//! - history.rs     - undo/redo ring
//! - render/        - frame producer
//! - pipeline.rs    - sim/renderer/UI orchestration
//! - thread_pool.rs - worker pool for off-thread jobs

pub mod air;
pub mod config;
pub mod coord_stack;
pub mod editing;
pub mod elements;
pub mod gravity;
pub mod history;
pub mod movement;
pub mod parts;
pub mod pipeline;
pub mod plane;
pub mod random;
pub mod render;
pub mod save;
pub mod settings;
pub mod signs;
pub mod simulation;
pub mod snapshot;
pub mod stickman;
pub mod thread_pool;
pub mod transitions;
pub mod update;
pub mod walls;

pub use config::{CheckFailed, FullConfig, SimulationConfig};
pub use editing::{DecoMode, EditError, REPLACE_MODE, SPECIFIC_DELETE};
pub use elements::{ElementRegistry, GolRule};
pub use history::{History, HistoryError};
pub use parts::Particle;
pub use pipeline::{Pipeline, RendererThreadState};
pub use render::{Renderer, RendererFrame, RendererSettings};
pub use save::{Codec, GameSave, ParseError};
pub use settings::{AirMode, DecoSpace, EdgeMode, GravityMode, SimulationSettings, TempScale};
pub use simulation::{RenderableSimulation, Simulation, SimulationSample};
pub use snapshot::{Snapshot, SnapshotDelta};

/// Engine version, from the crate manifest.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
