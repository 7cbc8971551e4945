//! Palimpsest Pipeline - restoration orchestration
//!
//! The pipeline that:
//! - Builds a semantic atlas of the damaged document (perception, fail-open)
//! - Renders one restored candidate guided by the atlas (the load-bearing
//!   stage; its failure is the run's failure)
//! - Re-validates critical regions concurrently (judging, fail-open)
//! - Surgically re-synthesizes failing regions in a bounded retry loop
//!   (refinement, never blocks)
//!
//! # Example
//!
//! ```rust,ignore
//! use palimpsest_pipeline::{PipelineConfig, PipelineOrchestrator, RunResult};
//!
//! # async fn example(transform: std::sync::Arc<dyn palimpsest_transform::ContentTransform>) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = PipelineOrchestrator::new(transform, PipelineConfig::new());
//! let outcome = orchestrator.run(&std::fs::read("scan.png")?, "image/png").await?;
//!
//! if let RunResult::Complete(restored) = outcome.result {
//!     std::fs::write("restored.png", restored)?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod judge;
pub mod perception;
pub mod progress;
pub mod refine;
pub mod restoration;
pub mod run;
pub mod stage;

pub use config::{ColorStyle, OutputResolution, PipelineConfig, RenderSettings};
pub use error::PipelineError;
pub use judge::ConsistencyJudge;
pub use perception::{AtlasBuilder, PerceptionOutcome};
pub use progress::{ProgressEntry, ProgressLog};
pub use refine::{Diagnosis, SurgicalRefiner};
pub use restoration::RestorationRenderer;
pub use run::{CancelHandle, PipelineOrchestrator, RunId, RunOutcome, RunResult};
pub use stage::{allowed_transitions, validate_transition, Stage};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the restoration pipeline
    pub use crate::{
        CancelHandle, PipelineConfig, PipelineError, PipelineOrchestrator, RenderSettings,
        RunOutcome, RunResult, Stage,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
