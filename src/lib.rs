//! Terminal client for the gibsi market dashboard backend.
//!
//! The library holds the token lifecycle (storage, refresh coordination,
//! 401 recovery), the session state machine with its timers, and typed
//! wrappers for the backend endpoints. `src/main.rs` is a thin CLI on top.

pub mod api;
pub mod config;
pub mod pages;
pub mod poller;
pub mod session;
pub mod store;
