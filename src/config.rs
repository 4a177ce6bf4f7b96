//! Configuration management for the Bookline gateway
//!
//! Read once at service start; sessions receive an immutable reference.
//! Missing provider credentials are fatal here, never per-call.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Business profile injected into prompts and scheduling
    pub business: BusinessConfig,

    /// Provider credentials
    pub providers: ProviderConfig,

    /// Data directory (database lives here)
    pub data_dir: PathBuf,
}

/// Business profile
#[derive(Debug, Clone, Deserialize)]
pub struct BusinessConfig {
    /// Name spoken in the greeting and prompts
    pub name: String,

    /// IANA timezone the business operates in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// First bookable hour of the day (24h)
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,

    /// Hour the business closes (24h, exclusive)
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    /// Default appointment length in minutes
    #[serde(default = "default_duration")]
    pub default_duration_minutes: u32,
}

/// Provider credentials and model choices
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Groq API key (primary reasoning provider)
    #[serde(default)]
    pub groq_api_key: Option<String>,

    /// Groq model identifier
    #[serde(default = "default_groq_model")]
    pub groq_model: String,

    /// `OpenAI` API key (fallback reasoning provider)
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// `OpenAI` model identifier
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Deepgram API key (streaming transcription)
    #[serde(default)]
    pub deepgram_api_key: Option<String>,

    /// Deepgram model identifier
    #[serde(default = "default_deepgram_model")]
    pub deepgram_model: String,

    /// `ElevenLabs` API key (streaming synthesis)
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,

    /// `ElevenLabs` voice identifier
    #[serde(default = "default_voice")]
    pub elevenlabs_voice: String,

    /// Twilio account SID (SMS confirmations)
    #[serde(default)]
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    #[serde(default)]
    pub twilio_auth_token: Option<String>,

    /// Twilio sender number in E.164
    #[serde(default)]
    pub twilio_from_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    business: Option<BusinessConfig>,
    providers: Option<ProviderConfig>,
    data_dir: Option<PathBuf>,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}
const fn default_open_hour() -> u32 {
    9
}
const fn default_close_hour() -> u32 {
    17
}
const fn default_duration() -> u32 {
    30
}
fn default_groq_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_deepgram_model() -> String {
    "nova-2-phonecall".to_string()
}
fn default_voice() -> String {
    "EXAVITQu4vr4xnSDxMaL".to_string()
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: "the office".to_string(),
            timezone: default_timezone(),
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            default_duration_minutes: default_duration(),
        }
    }
}

impl Config {
    /// Load configuration from the given TOML file (or defaults when absent),
    /// then apply environment overrides for credentials.
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or malformed, or if the
    /// resolved configuration is unusable (see [`Config::validate`]).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let raw = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("cannot read {}: {e}", p.display())))?;
                toml::from_str::<RawConfig>(&text)?
            }
            None => {
                let default_path = default_config_path();
                if default_path.as_ref().is_some_and(|p| p.exists()) {
                    let p = default_path.unwrap_or_default();
                    let text = std::fs::read_to_string(&p)
                        .map_err(|e| Error::Config(format!("cannot read {}: {e}", p.display())))?;
                    toml::from_str::<RawConfig>(&text)?
                } else {
                    RawConfig::default()
                }
            }
        };

        let mut providers = raw.providers.unwrap_or_default();
        apply_env_overrides(&mut providers);

        let data_dir = raw
            .data_dir
            .or_else(default_data_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Self {
            business: raw.business.unwrap_or_default(),
            providers,
            data_dir,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the resolved configuration
    ///
    /// # Errors
    ///
    /// Returns error if business hours are inverted or no reasoning
    /// provider is configured.
    pub fn validate(&self) -> Result<()> {
        if self.business.open_hour >= self.business.close_hour {
            return Err(Error::Config(format!(
                "open_hour {} must precede close_hour {}",
                self.business.open_hour, self.business.close_hour
            )));
        }
        if self.providers.groq_api_key.is_none() && self.providers.openai_api_key.is_none() {
            return Err(Error::Config(
                "no reasoning provider configured (set GROQ_API_KEY or OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_env_overrides(providers: &mut ProviderConfig) {
    let overrides: [(&str, &mut Option<String>); 7] = [
        ("GROQ_API_KEY", &mut providers.groq_api_key),
        ("OPENAI_API_KEY", &mut providers.openai_api_key),
        ("DEEPGRAM_API_KEY", &mut providers.deepgram_api_key),
        ("ELEVENLABS_API_KEY", &mut providers.elevenlabs_api_key),
        ("TWILIO_ACCOUNT_SID", &mut providers.twilio_account_sid),
        ("TWILIO_AUTH_TOKEN", &mut providers.twilio_auth_token),
        ("TWILIO_FROM_NUMBER", &mut providers.twilio_from_number),
    ];
    for (var, slot) in overrides {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "bookline", "bookline")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "bookline", "bookline")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_toml() {
        let raw: RawConfig = toml::from_str(
            r#"
            data_dir = "/tmp/bookline"

            [business]
            name = "Lakeside Dental"
            timezone = "America/Chicago"
            open_hour = 8
            close_hour = 18
            default_duration_minutes = 45

            [providers]
            groq_api_key = "gsk_test"
            "#,
        )
        .unwrap();

        let business = raw.business.unwrap();
        assert_eq!(business.name, "Lakeside Dental");
        assert_eq!(business.open_hour, 8);
        assert_eq!(raw.providers.unwrap().groq_api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn rejects_inverted_hours() {
        let config = Config {
            business: BusinessConfig {
                open_hour: 18,
                close_hour: 9,
                ..BusinessConfig::default()
            },
            providers: ProviderConfig {
                groq_api_key: Some("k".to_string()),
                ..ProviderConfig::default()
            },
            data_dir: PathBuf::from("."),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn requires_a_reasoning_provider() {
        let config = Config {
            business: BusinessConfig::default(),
            providers: ProviderConfig::default(),
            data_dir: PathBuf::from("."),
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
