pub mod event;
pub mod integrator;
pub mod plant;
pub mod runner;
pub mod summary;

pub use event::{EventDetector, EventKind, LoopEvent, SaturationDetector, SettlingDetector};
pub use plant::{LinearPlant, Plant, PlantConfig};
pub use runner::{simulate, simulate_with, LoopConfig, LoopSample, LoopTrace};
pub use summary::{write_summary, LoopSummary};
