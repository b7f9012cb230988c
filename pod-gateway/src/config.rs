//! Environment-driven configuration.
//!
//! Values come from the process environment after `.env` has been loaded by
//! `dotenvy`. Missing optional values fall back to defaults; values that are
//! present but unparsable are reported instead of silently ignored.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::server::ApiServerConfig;
use crate::credentials::{DEFAULT_SCOPE, OAuthSettings, RefreshSettings};
use crate::error::{Error, Result};
use crate::images::ImageId;

/// Default chat API base.
pub const DEFAULT_GIGACHAT_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1";
pub const DEFAULT_GIGACHAT_MODEL: &str = "GigaChat-2";
/// Default vision API base.
pub const DEFAULT_VISION_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_REFRESH_LEEWAY_SECS: u64 = 10;
const DEFAULT_IMAGE_TTL_SECS: i64 = 300;

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct GigaChatConfig {
    /// API base, `/chat/completions` is appended for proxied calls.
    pub api_url: String,
    /// Model named in shaped text prompts.
    pub model: String,
    pub max_tokens: u32,
    /// Timeout for chat calls. Token exchanges use `oauth.timeout`.
    pub api_timeout: Duration,
    pub oauth: OAuthSettings,
    pub refresh: RefreshSettings,
}

/// Vision backend for image prompts, authorized with a static API key.
#[derive(Clone)]
pub struct VisionConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Lifetime of an uploaded image, `Duration::ZERO` disables expiry.
    pub ttl: Duration,
    /// Prefix for image URLs handed out on upload. Empty yields relative URLs.
    pub public_base_url: String,
}

impl ImageConfig {
    /// Fetch URL handed out for a stored image.
    pub fn url_for(&self, id: ImageId) -> String {
        format!("{}/api/v1/images/{}", self.public_base_url, id)
    }

    /// `None` when uploads never expire.
    pub fn expires_in_secs(&self) -> Option<u64> {
        (!self.ttl.is_zero()).then_some(self.ttl.as_secs())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Filter directive, falls back to `RUST_LOG` and then the built-in default.
    pub filter: Option<String>,
    /// Directory for daily rolling log files.
    pub dir: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ApiServerConfig,
    pub gigachat: GigaChatConfig,
    /// `None` unless `OPENAI_API_KEY` is set.
    pub vision: Option<VisionConfig>,
    pub images: ImageConfig,
    pub logging: LogSettings,
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let mut server = ApiServerConfig::default();
        if let Some(bind_address) = env.string("API_BIND_ADDRESS") {
            server.bind_address = bind_address;
        }
        if let Some(port) = env.parse::<u16>("API_PORT")? {
            server.port = port;
        }
        if let Some(enable_cors) = env.flag("API_ENABLE_CORS")? {
            server.enable_cors = enable_cors;
        }
        if let Some(body_limit) = env.parse::<usize>("API_BODY_LIMIT_BYTES")? {
            server.body_limit = body_limit;
        }

        let timeout = Duration::from_secs(
            env.parse::<u64>("GIGACHAT_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let leeway = Duration::from_secs(
            env.parse::<u64>("GIGACHAT_TOKEN_REFRESH_LEEWAY_SECONDS")?
                .unwrap_or(DEFAULT_REFRESH_LEEWAY_SECS),
        );
        let gigachat = GigaChatConfig {
            api_url: env
                .string("GIGACHAT_URL")
                .unwrap_or_else(|| DEFAULT_GIGACHAT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: env
                .string("GIGACHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_GIGACHAT_MODEL.to_string()),
            // Zero falls back to the default limit.
            max_tokens: env
                .parse::<u32>("GIGACHAT_MAX_TOKENS")?
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            api_timeout: Duration::from_secs(
                env.parse::<u64>("GIGACHAT_API_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
            ),
            oauth: OAuthSettings {
                auth_url: env.required("GIGACHAT_AUTH_URL")?,
                basic_key: env.required("GIGACHAT_BASIC_KEY")?,
                scope: env
                    .string("GIGACHAT_SCOPE")
                    .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
                timeout,
                root_ca_path: env.string("GIGACHAT_ROOT_CA_PATH").map(PathBuf::from),
            },
            refresh: RefreshSettings::with_leeway(leeway),
        };

        let vision = match env.string("OPENAI_API_KEY") {
            Some(api_key) => Some(VisionConfig {
                api_url: env
                    .string("OPENAI_URL")
                    .unwrap_or_else(|| DEFAULT_VISION_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_key,
                model: env
                    .string("OPENAI_MODEL")
                    .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
                max_tokens: env.parse::<u32>("OPENAI_MAX_TOKENS")?.filter(|&n| n > 0),
                timeout: Duration::from_secs(
                    env.parse::<u64>("OPENAI_TIMEOUT_SECS")?
                        .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
                ),
            }),
            None => None,
        };

        // Negative or zero TTL disables expiry.
        let ttl_secs = env
            .parse::<i64>("IMAGE_TTL_SECONDS")?
            .unwrap_or(DEFAULT_IMAGE_TTL_SECS);
        let images = ImageConfig {
            ttl: Duration::from_secs(ttl_secs.max(0) as u64),
            public_base_url: env
                .string("PUBLIC_BASE_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
        };

        let logging = LogSettings {
            filter: env.string("LOG_FILTER").or_else(|| env.string("RUST_LOG")),
            dir: env.string("LOG_DIR").map(PathBuf::from),
            json: env.flag("LOG_JSON")?.unwrap_or(false),
        };

        Ok(Self {
            server,
            gigachat,
            vision,
            images,
            logging,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.string(key)
            .ok_or_else(|| Error::config(format!("{key} must be set")))
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::config(format!("{key}={raw:?} is invalid: {e}")))
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.string(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(None),
            Some("1" | "true" | "yes" | "on") => Ok(Some(true)),
            Some("0" | "false" | "no" | "off") => Ok(Some(false)),
            Some(other) => Err(Error::config(format!(
                "{key}={other:?} is not a boolean"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("GIGACHAT_AUTH_URL", "https://auth.example/api/v2/oauth"),
        ("GIGACHAT_BASIC_KEY", "Y2xpZW50OnNlY3JldA=="),
    ];

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.enable_cors);
        assert_eq!(config.server.body_limit, 10 * 1024 * 1024);

        assert_eq!(config.gigachat.api_url, DEFAULT_GIGACHAT_URL);
        assert_eq!(config.gigachat.oauth.scope, "GIGACHAT_API_PERS");
        assert_eq!(config.gigachat.oauth.timeout, Duration::from_secs(30));
        assert_eq!(config.gigachat.model, "GigaChat-2");
        assert_eq!(config.gigachat.max_tokens, 1024);
        assert_eq!(config.gigachat.api_timeout, Duration::from_secs(60));
        assert!(config.vision.is_none());
        assert!(config.gigachat.oauth.root_ca_path.is_none());
        assert_eq!(config.gigachat.refresh.refresh_leeway, Duration::from_secs(10));

        assert_eq!(config.images.ttl, Duration::from_secs(300));
        assert_eq!(config.images.public_base_url, "");
        assert!(!config.logging.json);
        assert!(config.logging.filter.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("API_PORT", "9000"),
            ("API_ENABLE_CORS", "false"),
            ("GIGACHAT_URL", "https://llm.example/api/v1/"),
            ("GIGACHAT_TOKEN_REFRESH_LEEWAY_SECONDS", "60"),
            ("GIGACHAT_ROOT_CA_PATH", "/etc/ssl/russian_trusted_root_ca.pem"),
            ("IMAGE_TTL_SECONDS", "45"),
            ("PUBLIC_BASE_URL", "https://gw.example/"),
            ("LOG_JSON", "1"),
            ("RUST_LOG", "debug"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(!config.server.enable_cors);
        assert_eq!(config.gigachat.api_url, "https://llm.example/api/v1");
        assert_eq!(config.gigachat.refresh.refresh_leeway, Duration::from_secs(60));
        assert_eq!(
            config.gigachat.oauth.root_ca_path,
            Some(PathBuf::from("/etc/ssl/russian_trusted_root_ca.pem"))
        );
        assert_eq!(config.images.ttl, Duration::from_secs(45));
        assert_eq!(config.images.public_base_url, "https://gw.example");
        assert!(config.logging.json);
        assert_eq!(config.logging.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_prompt_backends() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("GIGACHAT_MODEL", "GigaChat-2-Max"),
            ("GIGACHAT_MAX_TOKENS", "0"),
            ("GIGACHAT_API_TIMEOUT_SECS", "120"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_URL", "https://vision.example/v1/"),
            ("OPENAI_MAX_TOKENS", "512"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.gigachat.model, "GigaChat-2-Max");
        assert_eq!(config.gigachat.max_tokens, 1024);
        assert_eq!(config.gigachat.api_timeout, Duration::from_secs(120));
        // Chat calls and token exchanges time out independently.
        assert_eq!(config.gigachat.oauth.timeout, Duration::from_secs(30));

        let vision = config.vision.unwrap();
        assert_eq!(vision.api_url, "https://vision.example/v1");
        assert_eq!(vision.model, "gpt-4o-mini");
        assert_eq!(vision.max_tokens, Some(512));
        assert_eq!(vision.timeout, Duration::from_secs(60));
        assert!(!format!("{vision:?}").contains("sk-test"));
    }

    #[test]
    fn test_non_positive_ttl_disables_expiry() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("IMAGE_TTL_SECONDS", "-1"));
        assert_eq!(load(&vars).unwrap().images.ttl, Duration::ZERO);
    }

    #[test]
    fn test_missing_required_value() {
        let err = load(&[("GIGACHAT_AUTH_URL", "https://auth.example")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("GIGACHAT_BASIC_KEY")));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("API_PORT", "eighty"));
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("API_PORT")));
    }

    #[test]
    fn test_invalid_flag_is_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LOG_JSON", "maybe"));
        assert!(load(&vars).is_err());
    }
}
