//! Session management
//!
//! Provides [`SessionManager`], which turns verbs into registry and process
//! operations and enforces the session state machine.
//!
//! # Module Structure
//!
//! - `commands` - Verb protocol (`Request` in, `Outcome` out)
//! - `dispatcher` - Core `SessionManager` with public API
//! - `reaper` - Background eviction of idle sessions
//! - `helpers` - Pure helpers for rendering output

mod commands;
mod dispatcher;
mod helpers;
mod reaper;

pub use commands::{Outcome, Request};
pub use dispatcher::SessionManager;
pub use reaper::{reap_interval, spawn_idle_reaper};
