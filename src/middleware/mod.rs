//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Short-circuit requests (reject unauthenticated or non-admin callers)

/// Session authentication and admin gate
pub mod auth;
