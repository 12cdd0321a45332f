//! Application configuration.
//!
//! Configurations deserialize from TOML and validate before use:
//!
//! ```toml
//! name = "shop"
//! private_token = "..."
//! public_token = "..."
//! proxy = "http://proxy.internal:3128"
//!
//! [http]
//! timeout_secs = 20
//! ```
//!
//! Credentials may be omitted for the default application ([`DEFAULT_APP_NAME`]),
//! in which case they are read from [`PRIVATE_TOKEN_ENV`] and
//! [`PUBLIC_TOKEN_ENV`] at registration time.

use std::{fmt, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use crate::error::{PagoparError, Result};

/// Name of the default application.
pub const DEFAULT_APP_NAME: &str = "<DEFAULT>";

/// Environment variable holding the default application's private token.
pub const PRIVATE_TOKEN_ENV: &str = "PAGOPAR_PRIVATE_TOKEN";

/// Environment variable holding the default application's public token.
pub const PUBLIC_TOKEN_ENV: &str = "PAGOPAR_PUBLIC_TOKEN";

/// Production API base.
pub const DEFAULT_BASE_URL: &str = "https://api.pagopar.com/api/";

/// Configuration of one named application.
#[derive(Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Registry name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Private key. Never transmitted.
    #[serde(default)]
    pub private_token: Option<String>,

    /// Public key, sent with every call.
    #[serde(default)]
    pub public_token: Option<String>,

    /// Proxy URL applied to all requests.
    #[serde(default)]
    pub proxy: Option<String>,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            private_token: None,
            public_token: None,
            proxy: None,
            http: HttpConfig::default(),
        }
    }
}

impl fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("name", &self.name)
            .field("private_token", &self.private_token.as_ref().map(|_| "<redacted>"))
            .field("public_token", &self.public_token)
            .field("proxy", &self.proxy)
            .field("http", &self.http)
            .finish()
    }
}

impl ApplicationConfig {
    /// Creates a configuration for the named application with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Sets both credentials.
    #[must_use]
    pub fn with_credentials(mut self, private_token: impl Into<String>, public_token: impl Into<String>) -> Self {
        self.private_token = Some(private_token.into());
        self.public_token = Some(public_token.into());
        self
    }

    /// Routes all requests through `proxy`.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Replaces the HTTP settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::Configuration`] if the TOML is malformed or
    /// [`validate`](Self::validate) fails.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| PagoparError::Configuration(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::Configuration`] if the file cannot be read or
    /// parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PagoparError::Configuration(format!("cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Checks everything except credentials, which are resolved at
    /// registration.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::Configuration`] for an empty name, an
    /// unparsable proxy, or invalid HTTP settings.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PagoparError::Configuration("application name is empty".to_owned()));
        }
        if let Some(proxy) = &self.proxy {
            Url::parse(proxy).map_err(|e| PagoparError::Configuration(format!("invalid proxy URL: {e}")))?;
        }
        self.http.validate()
    }

    /// Resolves credentials, falling back to the process environment for the
    /// default application.
    pub(crate) fn resolve_credentials(&self) -> Result<(Zeroizing<String>, String)> {
        self.resolve_credentials_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn resolve_credentials_with<F>(&self, env: F) -> Result<(Zeroizing<String>, String)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fallback = self.name == DEFAULT_APP_NAME;
        let present = |value: &String| !value.trim().is_empty();
        let pick = |explicit: &Option<String>, var: &str| {
            explicit
                .clone()
                .filter(present)
                .or_else(|| if fallback { env(var).filter(present) } else { None })
        };

        let private = pick(&self.private_token, PRIVATE_TOKEN_ENV)
            .ok_or_else(|| PagoparError::Configuration(format!("private token missing for '{}'", self.name)))?;
        let public = pick(&self.public_token, PUBLIC_TOKEN_ENV)
            .ok_or_else(|| PagoparError::Configuration(format!("public token missing for '{}'", self.name)))?;
        Ok((Zeroizing::new(private), public))
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// API base every endpoint path is joined to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum idle connections per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Permits a plain `http` base URL. Intended for local mock servers.
    #[serde(default)]
    pub allow_insecure_http: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle(),
            allow_insecure_http: false,
        }
    }
}

impl HttpConfig {
    /// Validates timeouts and the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::Configuration`] if:
    /// - `timeout_secs` is outside 1-300
    /// - `connect_timeout_secs` is outside 1-60
    /// - `base_url` does not parse or is not HTTPS (unless `allow_insecure_http`)
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(PagoparError::Configuration("timeout_secs must be between 1 and 300".to_owned()));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 60 {
            return Err(PagoparError::Configuration(
                "connect_timeout_secs must be between 1 and 60".to_owned(),
            ));
        }
        self.api_base().map(|_| ())
    }

    /// Parsed API base, always ending in `/` so relative paths append.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::Configuration`] for an unparsable or insecure URL.
    pub fn api_base(&self) -> Result<Url> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| PagoparError::Configuration(format!("invalid base_url: {e}")))?;
        match url.scheme() {
            "https" => Ok(url),
            "http" if self.allow_insecure_http => Ok(url),
            _ => Err(PagoparError::Configuration("base_url must use HTTPS".to_owned())),
        }
    }

    /// Returns timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns connect timeout as Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_name() -> String {
    DEFAULT_APP_NAME.to_owned()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_pool_max_idle() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert!(!config.allow_insecure_http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_config_rejects_bad_timeouts() {
        let config = HttpConfig { timeout_secs: 0, ..HttpConfig::default() };
        assert!(config.validate().is_err());
        let config = HttpConfig { connect_timeout_secs: 61, ..HttpConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_base_requires_https() {
        let config = HttpConfig { base_url: "http://127.0.0.1:8080/api".to_owned(), ..HttpConfig::default() };
        assert!(matches!(config.api_base(), Err(PagoparError::Configuration(_))));

        let config = HttpConfig { allow_insecure_http: true, ..config };
        let base = config.api_base().unwrap();
        assert_eq!(base.as_str(), "http://127.0.0.1:8080/api/");
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            name = "shop"
            private_token = "priv"
            public_token = "pub"
            proxy = "http://proxy.local:3128"

            [http]
            timeout_secs = 20
        "#;

        let config = ApplicationConfig::from_toml(toml).unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(config.http.timeout_secs, 20);
        assert_eq!(config.http.connect_timeout_secs, 10);
    }

    #[test]
    fn test_from_toml_defaults_name() {
        let config = ApplicationConfig::from_toml("").unwrap();
        assert_eq!(config.name, DEFAULT_APP_NAME);
        assert!(config.private_token.is_none());
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(matches!(ApplicationConfig::from_toml("name = ["), Err(PagoparError::Configuration(_))));
        assert!(matches!(
            ApplicationConfig::from_toml("proxy = \"not a url\""),
            Err(PagoparError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_private_token() {
        let config = ApplicationConfig::new("shop").with_credentials("super-secret", "pub");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("pub"));
    }

    #[test]
    fn test_env_fallback_only_for_default_name() {
        let env = |key: &str| match key {
            PRIVATE_TOKEN_ENV => Some("env-priv".to_owned()),
            PUBLIC_TOKEN_ENV => Some("env-pub".to_owned()),
            _ => None,
        };

        let (private, public) = ApplicationConfig::default().resolve_credentials_with(env).unwrap();
        assert_eq!(private.as_str(), "env-priv");
        assert_eq!(public, "env-pub");

        let named = ApplicationConfig::new("shop");
        assert!(matches!(named.resolve_credentials_with(env), Err(PagoparError::Configuration(_))));
    }

    #[test]
    fn test_explicit_credentials_win_over_env() {
        let config = ApplicationConfig::default().with_credentials("priv", "pub");
        let (private, public) =
            config.resolve_credentials_with(|_| Some("env".to_owned())).unwrap();
        assert_eq!(private.as_str(), "priv");
        assert_eq!(public, "pub");
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let config = ApplicationConfig::new("shop").with_credentials("  ", "pub");
        assert!(matches!(config.resolve_credentials_with(|_| None), Err(PagoparError::Configuration(_))));
    }
}
