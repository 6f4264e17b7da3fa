//! Two-stage draft/review/patch harness for local llama.cpp-style servers.
//!
//! A drafter model streams code for a task while tokens and latency are
//! accounted live. A reviewer model then proposes line edits constrained to
//! an `s/old/new/` grammar, and the edits are applied mechanically, first
//! occurrence only, to produce the final text.

pub mod config;
pub mod extract;
pub mod patch;
pub mod pipeline;
pub mod stream;

pub use config::Config;
pub use pipeline::{Outcome, run};
pub use stream::{StreamError, StreamResult, stream_request};
