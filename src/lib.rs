//! Barrierefrei Check backend.
//!
//! REST API for website accessibility (WCAG / BITV) audits: single-page
//! scans, a WCAG rule library, accessibility statement generation, an AI
//! coach, support tickets, teams, live notifications and bundle/credit
//! billing through Mollie.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: HS256 session token in an HttpOnly cookie
//! - **Format**: JSON requests/responses, SSE for notifications

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the HTTP router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    // Admin routes additionally require the admin role
    let admin_routes = Router::new()
        .route("/api/admin/stats", get(handlers::admin::stats))
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route(
            "/api/admin/users/{id}/credits",
            post(handlers::admin::adjust_credits),
        )
        .route(
            "/api/admin/users/{id}/bundle",
            post(handlers::admin::set_bundle),
        )
        .route(
            "/api/admin/tickets/{id}",
            patch(handlers::tickets::update_status),
        )
        .route_layer(axum_middleware::from_fn(middleware::auth::require_admin));

    let authenticated_routes = Router::new()
        // Session
        .route("/api/auth/me", get(handlers::auth::me))
        // Credits, checkout and invoices
        .route("/api/credits", get(handlers::billing::get_credits))
        .route(
            "/api/checkout/bundle",
            post(handlers::billing::checkout_bundle),
        )
        .route(
            "/api/checkout/credits",
            post(handlers::billing::checkout_credits),
        )
        .route("/api/invoices", get(handlers::billing::list_invoices))
        .route(
            "/api/invoices/{id}/pdf",
            get(handlers::billing::invoice_pdf),
        )
        // Websites and scans
        .route(
            "/api/websites",
            post(handlers::websites::create_website).get(handlers::websites::list_websites),
        )
        .route(
            "/api/websites/{id}",
            delete(handlers::websites::delete_website),
        )
        .route(
            "/api/websites/{id}/scans",
            post(handlers::websites::start_scan).get(handlers::websites::list_scans),
        )
        .route("/api/scans/{id}", get(handlers::websites::get_scan))
        // Accessibility statements
        .route("/api/bfe/generate", post(handlers::bfe::generate))
        .route("/api/bfe", get(handlers::bfe::list))
        .route("/api/bfe/{id}/export", get(handlers::bfe::export))
        // WCAG coach
        .route("/api/wcag-coach", post(handlers::wcag::ask_coach))
        .route(
            "/api/wcag-coach/sessions",
            get(handlers::wcag::list_sessions),
        )
        .route(
            "/api/wcag-coach/sessions/{id}",
            get(handlers::wcag::get_session),
        )
        // Support tickets
        .route(
            "/api/tickets",
            post(handlers::tickets::create_ticket).get(handlers::tickets::list_tickets),
        )
        .route("/api/tickets/{id}", get(handlers::tickets::get_ticket))
        .route(
            "/api/tickets/{id}/messages",
            post(handlers::tickets::reply),
        )
        // Notifications
        .route("/api/notifications", get(handlers::notifications::list))
        .route(
            "/api/notifications/unread-count",
            get(handlers::notifications::unread_count),
        )
        .route(
            "/api/notifications/read-all",
            post(handlers::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/{id}/read",
            post(handlers::notifications::mark_read),
        )
        .route(
            "/api/notifications/stream",
            get(handlers::notifications::stream),
        )
        // Teams
        .route(
            "/api/teams",
            post(handlers::teams::create_team).get(handlers::teams::list_teams),
        )
        .route(
            "/api/teams/{id}/members",
            post(handlers::teams::add_member),
        )
        .route(
            "/api/teams/{id}/members/{user_id}",
            delete(handlers::teams::remove_member),
        )
        .merge(admin_routes)
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/verify-email", post(handlers::auth::verify_email))
        .route(
            "/api/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/api/bundles", get(handlers::billing::list_bundles))
        .route("/api/wcag/rules", get(handlers::wcag::list_rules))
        .route("/api/wcag/rules/{id}", get(handlers::wcag::get_rule))
        .route(
            "/api/webhooks/mollie",
            post(handlers::webhooks::mollie_webhook),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http());

    let app = match cors_layer(&state.config.app_base_url) {
        Some(cors) => app.layer(cors),
        None => {
            tracing::warn!(
                base_url = %state.config.app_base_url,
                "APP_BASE_URL is not a valid origin, CORS disabled"
            );
            app
        }
    };

    app.with_state(state)
}

/// CORS for the web frontend: its origin only, with credentials so the
/// session cookie is sent along.
fn cors_layer(base_url: &str) -> Option<CorsLayer> {
    let origin = url::Url::parse(base_url).ok()?.origin().ascii_serialization();
    let origin = HeaderValue::from_str(&origin).ok()?;

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_from_base_url() {
        assert!(cors_layer("https://app.example.de/").is_some());
        assert!(cors_layer("not a url").is_none());
    }
}
