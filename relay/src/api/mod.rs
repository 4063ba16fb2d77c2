//! API Module
//!
//! HTTP API endpoints for the relay.

pub mod handlers;
pub mod routes;
pub mod types;

pub use handlers::ApiState;
pub use routes::create_router;
