//!
//! Configuration management for the Cloud Code proxy.
//!
//! Handles loading configuration from environment variables with sensible defaults.
//! Follows Single Responsibility Principle - manages all configuration concerns.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;

use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application configuration structure.
///
/// Contains all runtime configuration options loaded from environment variables.
/// The proxy does not load from a config file or persist upstream credentials
/// itself; those are external collaborators that hand this process a port, an
/// API key, and an upstream URL.
#[derive(Debug, Clone)]
pub struct Config {
    /** bearer token compared byte-for-byte against `Authorization` headers */
    pub proxy_api_key: String,
    /** HTTP server port number */
    pub port: u16,
    /** upstream model id used when the router has no entry and fallback is enabled */
    pub default_model: String,
    /** base URL of the Cloud Code upstream service */
    pub upstream_url: String,
    /** ngrok auth token, threaded through for the out-of-scope tunnelling collaborator */
    pub ngrok_auth_token: Option<String>,
    /** application logging level */
    pub log_level: LogLevel,
    /** whether unknown caller models fall back to `default_model` instead of 400 */
    pub fallback: bool,
    /** whether to retry a single empty upstream response */
    pub enable_retries: bool,
}

///
/// Logging level enumeration.
///
/// Defines available log levels with helper methods for level checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/* --- start of code -------------------------------------------------------------------------- */

impl LogLevel {
    ///
    /// Check if trace-level logging is enabled.
    ///
    /// Returns true for Trace and Debug levels, which enable detailed logging
    /// of translated requests and upstream events.
    ///
    /// # Returns
    ///  * `true` if trace logging should be enabled
    ///  * `false` otherwise
    pub fn is_trace_enabled(self) -> bool {
        matches!(self, LogLevel::Trace | LogLevel::Debug)
    }

    /// Render as the `tracing_subscriber::EnvFilter` directive it corresponds to.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<&str> for LogLevel {
    ///
    /// Convert string representation to LogLevel enum.
    ///
    /// Case-insensitive conversion with Info as the default fallback.
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl Config {
    ///
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file if present, then reads configuration from
    /// environment variables with sensible defaults.
    ///
    /// # Returns
    ///  * Configuration object with all settings loaded
    ///  * `ProxyError::BadRequest` if required variables are missing or invalid
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let proxy_api_key = Self::get_proxy_api_key()?;
        let port = Self::get_port()?;
        let default_model = env::var("DEFAULT_MODEL").unwrap_or_else(|_| "gemini-3-pro".to_string());
        let upstream_url = Self::get_upstream_url()?;
        let ngrok_auth_token = env::var("NGROK_AUTH_TOKEN").ok();
        let debug = Self::get_bool_env("DEBUG", false);
        let log_level = if debug { LogLevel::Debug } else { Self::get_log_level() };
        let fallback = Self::get_bool_env("FALLBACK", false);
        let enable_retries = Self::get_bool_env("ENABLE_RETRIES", true);

        Ok(Config {
            proxy_api_key,
            port,
            default_model,
            upstream_url,
            ngrok_auth_token,
            log_level,
            fallback,
            enable_retries,
        })
    }

    ///
    /// Get the proxy API key from environment.
    ///
    /// # Returns
    ///  * The bearer token callers must present
    ///  * `ProxyError::BadRequest` if `PROXY_API_KEY` is not set
    fn get_proxy_api_key() -> Result<String> {
        env::var("PROXY_API_KEY").map_err(|_| {
            ProxyError::BadRequest(
                "PROXY_API_KEY environment variable is not set.\n\
         \n\
         To fix this:\n\
           1. Choose a local API key string\n\
           2. Set the environment variable:\n\
              export PROXY_API_KEY=\"your-local-key\"\n\
           3. Or add it to a .env file"
                    .to_string(),
            )
        })
    }

    ///
    /// Get the upstream base URL from environment.
    ///
    /// # Returns
    ///  * Upstream URL string
    ///  * `ProxyError::BadRequest` if `UPSTREAM_URL` is not set
    fn get_upstream_url() -> Result<String> {
        env::var("UPSTREAM_URL").map_err(|_| {
            ProxyError::BadRequest(
                "UPSTREAM_URL environment variable is not set.\n\
         \n\
         To fix this:\n\
           1. Set the base URL of the Cloud Code upstream service\n\
           2. Set the environment variable:\n\
              export UPSTREAM_URL=\"https://your-upstream.example.com\"\n\
           3. Or add it to a .env file"
                    .to_string(),
            )
        })
    }

    ///
    /// Get the server port from environment or use default.
    ///
    /// # Returns
    ///  * Port number as u16
    ///  * `ProxyError::BadRequest` if the port value is invalid
    fn get_port() -> Result<u16> {
        env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| ProxyError::BadRequest(format!("Invalid PORT value: {e}")))
    }

    ///
    /// Get the log level from environment or use default.
    fn get_log_level() -> LogLevel {
        let log_level_str = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        LogLevel::from(log_level_str.as_str())
    }

    fn get_bool_env(key: &str, default: bool) -> bool {
        env::var(key).ok().map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(default)
    }
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_from_str_falls_back_to_info() {
        assert_eq!(LogLevel::from("bogus"), LogLevel::Info);
        assert_eq!(LogLevel::from("DEBUG"), LogLevel::Debug);
    }

    #[test]
    fn log_level_trace_enabled_only_for_trace_and_debug() {
        assert!(LogLevel::Trace.is_trace_enabled());
        assert!(LogLevel::Debug.is_trace_enabled());
        assert!(!LogLevel::Info.is_trace_enabled());
    }
}
