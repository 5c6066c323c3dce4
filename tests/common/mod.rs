//! Helpers shared by the integration test binaries.
#![allow(dead_code)]

use axum::{body::to_bytes, response::Response};
use barrierefrei_server::config::Config;
use serde_json::Value;

pub const SECRET: &str = "integration-secret";

pub fn config(mollie_api_base: &str) -> Config {
    Config {
        database_url: "postgres://postgres@127.0.0.1:1/unused".to_string(),
        server_port: 0,
        db_max_connections: 1,
        jwt_secret: SECRET.to_string(),
        jwt_ttl_hours: 1,
        cookie_secure: false,
        app_base_url: "http://localhost:3000".to_string(),
        mollie_api_key: "test_dummy".to_string(),
        mollie_api_base: mollie_api_base.to_string(),
        llm_api_key: None,
        llm_api_base: "http://127.0.0.1:1/v1".to_string(),
        llm_model: "test-model".to_string(),
        smtp_host: None,
        smtp_port: 587,
        smtp_username: None,
        smtp_password: None,
        mail_from: "Test <test@localhost>".to_string(),
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
