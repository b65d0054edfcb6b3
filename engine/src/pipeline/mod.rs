//! Pipeline Orchestrator
//!
//! Sequences analysts, the research debate, the trader and the risk panel
//! into one run, and turns the first fault into a structured
//! [`RunFailure`](crate::error::RunFailure).

pub mod orchestrator;
pub mod outcome;
pub mod plan;

pub use orchestrator::{OrchestratorBuilder, PipelineOrchestrator, SEED_ORIGIN};
pub use outcome::RunOutcome;
pub use plan::{analyst_report_key, analyst_stage, stages, PipelinePlan, SynthesisStep};
