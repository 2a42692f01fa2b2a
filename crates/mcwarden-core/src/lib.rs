//! `mcwarden` Core Library
//!
//! Shared functionality for `mcwarden` components:
//! - Incremental line reassembly and ordered pattern dispatch
//! - The event record published to subscribers
//! - Settings resolution and bootstrap
//! - Tracing initialisation and common error types

pub mod error;
pub mod event;
pub mod lines;
pub mod settings;
pub mod tracing_init;

pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use lines::{DispatchOutcome, LineDispatcher, LineSplitter};
pub use settings::Settings;
