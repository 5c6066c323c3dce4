//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and calls to external
//! providers (Mollie, the LLM API, SMTP).

pub mod auth_service;
pub mod bfe_service;
pub mod coach_service;
pub mod credit_service;
pub mod invoice_service;
pub mod mail;
pub mod notification_service;
pub mod payment_service;
pub mod scan_service;
pub mod wcag_library;
