//! Backend API: the authenticated client, refresh coordination and the
//! endpoint wrappers grouped by area.

pub mod admin;
pub mod auth;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod market;

pub use auth::{LoginRequest, RegisterRequest, TokenPair, UserProfile, UserType};
pub use client::{ApiClient, ApiRequest};
pub use coordinator::{RefreshCoordinator, RefreshRejected};
pub use error::{ApiError, Result};
