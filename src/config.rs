//! Application configuration management.
//!
//! Configuration is read from environment variables with `envy`, after an
//! optional `.env` file has been loaded with `dotenvy`.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): HMAC secret for session tokens
/// - `MOLLIE_API_KEY` (required): payment provider API key
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `APP_BASE_URL` (optional): public URL used for redirects, webhooks and mail links
/// - `SMTP_HOST` (optional): when unset, outgoing mail is only logged
/// - `LLM_API_KEY` (optional): when unset, the coach endpoint answers 502
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    pub jwt_secret: String,

    #[serde(default = "default_jwt_ttl_hours")]
    pub jwt_ttl_hours: i64,

    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,

    #[serde(default = "default_base_url")]
    pub app_base_url: String,

    pub mollie_api_key: String,

    #[serde(default = "default_mollie_base")]
    pub mollie_api_base: String,

    pub llm_api_key: Option<String>,

    #[serde(default = "default_llm_base")]
    pub llm_api_base: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub smtp_username: Option<String>,

    pub smtp_password: Option<String>,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_jwt_ttl_hours() -> i64 {
    24 * 7
}

fn default_cookie_secure() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_mollie_base() -> String {
    "https://api.mollie.com/v2".to_string()
}

fn default_llm_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Barrierefrei Check <noreply@localhost>".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot
    /// be parsed into the expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>()
    }

    /// Public URL for a path, without doubling the slash.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.app_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/barrierefrei_test".to_string(),
        server_port: default_port(),
        db_max_connections: 1,
        jwt_secret: "test-secret".to_string(),
        jwt_ttl_hours: 1,
        cookie_secure: false,
        app_base_url: "https://app.example.de/".to_string(),
        mollie_api_key: "test_key".to_string(),
        mollie_api_base: default_mollie_base(),
        llm_api_key: None,
        llm_api_base: default_llm_base(),
        llm_model: default_llm_model(),
        smtp_host: None,
        smtp_port: default_smtp_port(),
        smtp_username: None,
        smtp_password: None,
        mail_from: default_mail_from(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_joins_without_double_slash() {
        let config = test_config();
        assert_eq!(
            config.public_url("/api/webhooks/mollie"),
            "https://app.example.de/api/webhooks/mollie"
        );
    }
}
