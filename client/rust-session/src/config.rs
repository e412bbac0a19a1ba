use config::ConfigError;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_IDENTITY_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
pub const DEFAULT_SIGN_IN_PATH: &str = "/login";
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct IdentitySettings {
    pub base_url: String,
    pub token_url: String,
    pub api_key: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_IDENTITY_BASE_URL.to_string(),
            token_url: DEFAULT_IDENTITY_TOKEN_URL.to_string(),
            api_key: String::new(),
        }
    }
}

impl std::fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Where the credential is persisted. `None` keeps it in memory only.
    pub credential_path: Option<PathBuf>,
    pub sign_in_path: String,
    /// Tokens older than this are refreshed before use.
    pub token_refresh_after: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            credential_path: None,
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            token_refresh_after: Duration::from_secs(55 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub max_file_bytes: u64,
    /// Lowercase, without the leading dot.
    pub required_extension: String,
    pub tick_interval: Duration,
    pub progress_step: u8,
    /// Simulated progress never reaches this until the server answers.
    pub progress_ceiling: u8,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: MAX_UPLOAD_BYTES,
            required_extension: "csv".to_string(),
            tick_interval: Duration::from_millis(200),
            progress_step: 10,
            progress_ceiling: 90,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub api: ApiSettings,
    pub identity: IdentitySettings,
    pub session: SessionSettings,
    pub upload: UploadSettings,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // Local .env is optional; real env vars always win over it
        dotenvy::dotenv().ok();

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings)
    }

    /// Resolves every key from `settings`, then the plain env var, then the
    /// built-in default.
    pub fn from_settings(settings: &config::Config) -> Result<Self, ConfigError> {
        let api = ApiSettings {
            base_url: url_setting(settings, "api.base_url", "API_BASE_URL", DEFAULT_API_BASE_URL)?,
        };

        let identity = IdentitySettings {
            base_url: url_setting(
                settings,
                "identity.base_url",
                "IDENTITY_BASE_URL",
                DEFAULT_IDENTITY_BASE_URL,
            )?,
            token_url: url_setting(
                settings,
                "identity.token_url",
                "IDENTITY_TOKEN_URL",
                DEFAULT_IDENTITY_TOKEN_URL,
            )?,
            api_key: lookup(settings, "identity.api_key", Some("IDENTITY_API_KEY"))?
                .unwrap_or_else(|| {
                    tracing::warn!("IDENTITY_API_KEY is not set; sign-in requests will be rejected");
                    String::new()
                }),
        };

        let sign_in_path = lookup(settings, "session.sign_in_path", None)?
            .unwrap_or_else(|| DEFAULT_SIGN_IN_PATH.to_string());
        if !sign_in_path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "session.sign_in_path must be an absolute path, got {}",
                sign_in_path
            )));
        }

        let refresh_secs: u64 = parse_setting(settings, "session.token_refresh_after_secs", None, 55 * 60)?;
        let session = SessionSettings {
            credential_path: lookup(settings, "session.credential_path", Some("CREDENTIAL_PATH"))?
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            sign_in_path,
            token_refresh_after: Duration::from_secs(refresh_secs),
        };

        let upload = upload_settings(settings)?;

        Ok(Config {
            api,
            identity,
            session,
            upload,
        })
    }
}

fn upload_settings(settings: &config::Config) -> Result<UploadSettings, ConfigError> {
    let defaults = UploadSettings::default();

    let max_file_bytes = parse_setting(settings, "upload.max_file_bytes", None, defaults.max_file_bytes)?;
    let tick_ms: u64 = parse_setting(
        settings,
        "upload.tick_interval_ms",
        None,
        defaults.tick_interval.as_millis() as u64,
    )?;
    let progress_step = parse_setting(settings, "upload.progress_step", None, defaults.progress_step)?;
    let progress_ceiling =
        parse_setting(settings, "upload.progress_ceiling", None, defaults.progress_ceiling)?;
    let required_extension = lookup(settings, "upload.required_extension", None)?
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .unwrap_or(defaults.required_extension);

    if max_file_bytes == 0 || tick_ms == 0 || progress_step == 0 {
        return Err(ConfigError::Message(
            "upload.max_file_bytes, upload.tick_interval_ms and upload.progress_step must be positive"
                .to_string(),
        ));
    }
    if progress_ceiling == 0 || progress_ceiling >= 100 {
        return Err(ConfigError::Message(format!(
            "upload.progress_ceiling must be between 1 and 99, got {}",
            progress_ceiling
        )));
    }
    if required_extension.is_empty() {
        return Err(ConfigError::Message(
            "upload.required_extension must not be empty".to_string(),
        ));
    }

    Ok(UploadSettings {
        max_file_bytes,
        required_extension,
        tick_interval: Duration::from_millis(tick_ms),
        progress_step,
        progress_ceiling,
    })
}

fn lookup(
    settings: &config::Config,
    key: &str,
    env_var: Option<&str>,
) -> Result<Option<String>, ConfigError> {
    match settings.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(env_var.and_then(|name| env::var(name).ok())),
        Err(e) => Err(e),
    }
}

fn parse_setting<T>(
    settings: &config::Config,
    key: &str,
    env_var: Option<&str>,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(settings, key, env_var)? {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::Message(format!("Invalid value for {}: {:?} ({})", key, raw, e))),
        None => Ok(default),
    }
}

fn url_setting(
    settings: &config::Config,
    key: &str,
    env_var: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let raw = lookup(settings, key, Some(env_var))?.unwrap_or_else(|| default.to_string());
    url::Url::parse(&raw)
        .map_err(|e| ConfigError::Message(format!("Invalid URL for {}: {:?} ({})", key, raw, e)))?;
    Ok(raw.trim_end_matches('/').to_string())
}
