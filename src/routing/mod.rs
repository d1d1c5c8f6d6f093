//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (startup):
//!     App::get / post / all / use_middleware
//!     → matcher.rs (compile path patterns)
//!     → chain.rs (append entries in call order)
//!     → frozen as Arc<MiddlewareChain>
//!
//! Dispatch (per request):
//!     Request (method, path)
//!     → chain.rs (first entry after index whose predicate holds)
//!     → merge extracted params into the request
//!     → handler(req, res, next); next resumes after that entry
//! ```
//!
//! # Design Decisions
//! - Deterministic: same registrations and input always match the same entry
//! - First match wins (ordered by registration)
//! - Unmatched requests end silently; add a catch-all for a default

pub mod chain;
pub mod events;
pub mod matcher;
pub mod router;

pub use chain::{handler, BoxHandler, Handler, HandlerFuture, MiddlewareChain, Next};
pub use events::EventEmitter;
pub use matcher::{PathMatcher, PathPattern, PathSpec};
pub use router::App;
