//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (Gateway::listen):
//!     Bind bindings → Start reply consumers → Start sweeper → Accept HTTP
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Consumers, sweeper and services exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only once every reply consumer runs)
//! - Every long-running task subscribes to the same broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
