//! Client-side session handling for the route2rise lead management app.
//!
//! - [`auth`]: credential storage and the authenticated/unauthenticated gate
//! - [`api`]: HTTP client that carries the bearer token and ends the session on 401
//! - [`router`]: which view a path shows for a given auth state
//! - [`context`]: wires the pieces together with an explicit init/dispose lifecycle

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod router;

pub use api::{ApiClient, ApiError, ApiResult, HealthStatus};
pub use auth::{AuthEvent, AuthGate, AuthSnapshot, AuthState, Credential, SessionStore};
pub use config::Config;
pub use context::SessionContext;
pub use router::{resolve, Navigator, Resolution, View};
