//! Server configuration.

use std::path::PathBuf;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Cross-origin policy for the served store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Development posture: any origin (mirrored), credentials allowed,
    /// any method and header.
    AllowAny,
    /// Production posture: only the listed origins.
    Origins(Vec<String>),
}

impl CorsPolicy {
    /// Parse a comma-separated origin list; empty means allow any.
    pub fn from_origin_list(origins: &str) -> Self {
        let origins: Vec<String> = origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        if origins.is_empty() {
            Self::AllowAny
        } else {
            Self::Origins(origins)
        }
    }

    /// Build the CORS middleware for this policy.
    pub fn layer(&self) -> CorsLayer {
        match self {
            // Mirrors the request origin and allows credentialed requests.
            Self::AllowAny => CorsLayer::very_permissive(),
            Self::Origins(origins) => {
                let origins: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|o| o.parse().ok())
                    .collect();
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::AllowAny
    }
}

/// Configuration of one server instance.
///
/// Constructed by the entry point and passed into
/// [`build_router`](crate::app::build_router); tests can build as many
/// independent instances as they need.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:8000".
    pub listen: String,
    /// URL path prefix the store is mounted under.
    pub route_prefix: String,
    /// Directory containing the pyramid store(s).
    pub data_dir: PathBuf,
    /// Cross-origin policy.
    pub cors: CorsPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            route_prefix: "/data".to_string(),
            data_dir: PathBuf::from("public/data"),
            cors: CorsPolicy::AllowAny,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.route_prefix.starts_with('/') || self.route_prefix.len() < 2 {
            return Err(format!(
                "route_prefix must be a non-root path starting with '/', got '{}'",
                self.route_prefix
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_list_parsing() {
        assert_eq!(CorsPolicy::from_origin_list(""), CorsPolicy::AllowAny);
        assert_eq!(CorsPolicy::from_origin_list("  "), CorsPolicy::AllowAny);
        assert_eq!(
            CorsPolicy::from_origin_list("https://maps.example.com, https://dev.example.com"),
            CorsPolicy::Origins(vec![
                "https://maps.example.com".to_string(),
                "https://dev.example.com".to_string(),
            ])
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.route_prefix = "data".to_string();
        assert!(config.validate().is_err());

        config.route_prefix = "/".to_string();
        assert!(config.validate().is_err());
    }
}
