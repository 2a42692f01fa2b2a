//! Line engine for supervised process output.
//!
//! Raw output chunks are reassembled into complete lines by [`LineSplitter`]
//! and each complete line is routed by [`LineDispatcher`] to the first rule
//! whose pattern matches it.

mod dispatcher;
mod splitter;

pub use dispatcher::{DispatchOutcome, DispatchRule, LineDispatcher, LineDispatcherBuilder};
pub use splitter::LineSplitter;
