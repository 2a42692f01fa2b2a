//! mcwarden Daemon Library
//!
//! - Supervision of the game server process (restart, graceful stop, kill)
//! - Event bus with bounded replay history and presence state
//! - Built-in console line rules
//! - Server-sent event feed for browser subscribers

pub mod bus;
pub mod console;
pub mod rules;
pub mod server;
pub mod supervisor;
