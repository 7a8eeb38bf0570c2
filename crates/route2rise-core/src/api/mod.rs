//! REST API client module for the route2rise backend.
//!
//! This module provides the `ApiClient` used by everything that talks to
//! the backend. It attaches the stored bearer token to each request and
//! turns a 401 into the end of the session.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiResult, HealthStatus};
pub use error::ApiError;
