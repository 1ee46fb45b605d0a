//! Intake pipeline: classify → extract → route → persist.

pub mod classifier;
pub mod orchestrator;
pub mod router;
pub mod state;
pub mod types;

pub use classifier::Classifier;
pub use orchestrator::IntakePipeline;
pub use router::{ActionRouter, Condition, RoutingRule};
pub use state::PipelineStage;
