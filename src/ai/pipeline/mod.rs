//! Generation Pipelines
//!
//! Orchestrators composed from catalog operations.
//!
//! ## Pipelines
//!
//! ```text
//! Multi-step:  Architecture → Coding → Testing → Refining → Done
//!                   ↓ (first failure)
//!                 Error (earlier outputs preserved)
//!
//! Streaming:   code fragments → code complete → explanation fragments → explanation complete
//! ```
//!
//! Both run on an assistant chosen once by the router before they start.

mod multi_step;
mod streaming;

pub use multi_step::{MultiStepResult, RunStatus, run_multi_step};
pub use streaming::{EventKind, EventStream, StreamEvent, StreamMode, stream_pipeline};
