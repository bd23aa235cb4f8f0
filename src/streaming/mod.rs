//! Streaming delivery of transcoded media.
//!
//! The responder pulls bytes from a transcoder one quota at a time; the
//! registry keeps suspended exchanges alive between round trips and reaps the
//! ones whose client never returns.

pub mod registry;
pub mod responder;

pub use registry::{start_sweep_task, StreamRegistry, StreamSummary};
pub use responder::{Outcome, StreamingResponder, Transport};
