//! Business logic services.

pub mod generation;
pub mod job_registry;
pub mod panels;

pub use generation::{GenerationError, GenerationPipeline};
pub use job_registry::{BeginOutcome, GenerationToken, JobRegistry, SweeperHandle};
pub use panels::{PanelService, SubmitOutcome};
