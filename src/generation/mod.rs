pub mod service;
pub mod simulation;

pub use service::GenerationService;
pub use simulation::SimulationPolicy;
