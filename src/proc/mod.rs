// src/proc/mod.rs

//! Child process layer.
//!
//! Runs registered scripts as `<shell> -c <path>` children with piped
//! stdout/stderr and reports back to the supervisor loop as events.
//!
//! - [`backend`] provides the [`ProcessBackend`] trait the runtime talks to,
//!   plus the concrete [`RealProcessBackend`] that owns live child slots.
//!   Tests substitute a fake backend that spawns nothing.
//! - [`child`] implements per-child plumbing: the line readers draining the
//!   output pipes and the watcher that turns process exit (or a terminate
//!   request) into an `Exited` event.

pub mod backend;
pub mod child;

pub use backend::{ProcessBackend, RealProcessBackend};
