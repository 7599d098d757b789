//! # Hub
//!
//! The process-wide composition root: registries for components, commands,
//! and singletons; foundation initialization (logging + tracing +
//! event-set coordination) with once-only semantics; factory-based
//! dependency resolution; and the coordinated reset used by test suites.
//!
//! ## Overview
//!
//! Applications register dependencies on the hub, resolve the top-level
//! component, and let registered factories wire intermediate dependencies.
//! Reaching for [`get_hub`] from deep inside a codebase is the
//! service-locator fallback, reserved for cross-cutting concerns (logger,
//! configuration).
//!
//! ## Usage
//!
//! ```no_run
//! use foundation_hub::get_hub;
//!
//! fn main() -> foundation_errors::Result<()> {
//!     let hub = get_hub();
//!     hub.initialize_foundation(None, None, true)?;
//!
//!     foundation_logging::get_logger("app").info("service_started", &[]);
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod components;
pub mod hub;
pub mod reset;

pub use commands::{CommandHandler, CommandInfo, RegisteredCommand};
pub use components::{Component, ComponentInfo};
pub use hub::{get_hub, Hub};
pub use reset::reset_foundation_state;
