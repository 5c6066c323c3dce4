//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, session context)
//! 2. Delegates to a service or runs a simple query
//! 3. Returns HTTP response (JSON, file download or event stream)

/// Statistics, user and bundle management
pub mod admin;
/// Registration, login and account recovery
pub mod auth;
/// Accessibility statements
pub mod bfe;
/// Bundles, credits, checkout and invoices
pub mod billing;
pub mod health;
pub mod notifications;
pub mod teams;
pub mod tickets;
/// WCAG rule library and coach
pub mod wcag;
pub mod webhooks;
pub mod websites;
