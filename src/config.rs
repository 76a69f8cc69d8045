use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};

use crate::{
    audio::player::PlayerSettings,
    sources::{
        direct_url::FetchSettings,
        transcoder::{default_install_paths, DecoderLocator, TranscodeSettings},
    },
};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Commands register per guild when set

    // Decoder
    pub ffmpeg_path: Option<PathBuf>,
    pub ffmpeg_search_paths: Vec<PathBuf>,
    pub ffmpeg_bundled_path: Option<PathBuf>,
    pub transcode_timeout: Duration,
    pub reconnect_max_retries: u32,
    pub reconnect_delay_max: Duration,

    // Network
    pub connect_timeout: Duration,
    pub max_redirects: usize,

    // Voice
    pub voice_ready_timeout: Duration,

    // Catalog
    pub stations_file: Option<PathBuf>,
}

fn env_or<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid value for {name}"))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Decoder
            ffmpeg_path: env_path("FFMPEG_PATH"),
            ffmpeg_search_paths: match std::env::var("FFMPEG_SEARCH_PATHS") {
                Ok(val) if !val.trim().is_empty() => val
                    .split(':')
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect(),
                _ => default_install_paths(),
            },
            ffmpeg_bundled_path: env_path("FFMPEG_BUNDLED_PATH"),
            transcode_timeout: Duration::from_secs(env_or("TRANSCODE_TIMEOUT_SECS", "15")?),
            reconnect_max_retries: env_or("RECONNECT_MAX_RETRIES", "5")?,
            reconnect_delay_max: Duration::from_secs(env_or("RECONNECT_DELAY_MAX_SECS", "5")?),

            // Network
            connect_timeout: Duration::from_secs(env_or("CONNECT_TIMEOUT_SECS", "10")?),
            max_redirects: env_or("MAX_REDIRECTS", "10")?,

            // Voice
            voice_ready_timeout: Duration::from_secs(env_or("VOICE_READY_TIMEOUT_SECS", "20")?),

            // Catalog
            stations_file: env_path("STATIONS_FILE"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Timeouts of zero would make every station fail on the first attempt,
    /// and an unbounded redirect count defeats the loop protection.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.transcode_timeout.is_zero() {
            anyhow::bail!("Transcode timeout must be greater than 0");
        }

        if self.connect_timeout.is_zero() {
            anyhow::bail!("Connect timeout must be greater than 0");
        }

        if self.voice_ready_timeout.is_zero() {
            anyhow::bail!("Voice ready timeout must be greater than 0");
        }

        if self.max_redirects == 0 || self.max_redirects > 50 {
            anyhow::bail!("Max redirects must be between 1 and 50, got: {}", self.max_redirects);
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Decoder: {} (+{} search paths), first data within {}, reconnect x{} up to {}\n  \
            Network: connect within {}, {} redirects max\n  \
            Voice: ready within {}\n  \
            Stations: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.ffmpeg_path
                .as_ref()
                .map_or("auto".to_string(), |p| p.display().to_string()),
            self.ffmpeg_search_paths.len(),
            humantime::format_duration(self.transcode_timeout),
            self.reconnect_max_retries,
            humantime::format_duration(self.reconnect_delay_max),
            humantime::format_duration(self.connect_timeout),
            self.max_redirects,
            humantime::format_duration(self.voice_ready_timeout),
            self.stations_file
                .as_ref()
                .map_or("built-in".to_string(), |p| p.display().to_string()),
        )
    }

    pub fn transcode_settings(&self) -> TranscodeSettings {
        TranscodeSettings {
            locators: DecoderLocator::default_order(
                self.ffmpeg_path.clone(),
                &self.ffmpeg_search_paths,
                self.ffmpeg_bundled_path.clone(),
            ),
            first_data_timeout: self.transcode_timeout,
            reconnect_max_retries: self.reconnect_max_retries,
            reconnect_delay_max: self.reconnect_delay_max,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: self.connect_timeout,
            max_redirects: self.max_redirects,
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            ready_timeout: self.voice_ready_timeout,
            ..PlayerSettings::default()
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Decoder defaults
            ffmpeg_path: None,
            ffmpeg_search_paths: default_install_paths(),
            ffmpeg_bundled_path: None,
            transcode_timeout: Duration::from_secs(15),
            reconnect_max_retries: 5,
            reconnect_delay_max: Duration::from_secs(5),

            // Network defaults
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,

            // Voice defaults
            voice_ready_timeout: Duration::from_secs(20),

            stations_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> Config {
        Config {
            discord_token: "token".into(),
            application_id: 1,
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_needs_token() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = Config {
            connect_timeout: Duration::ZERO,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_redirects: 0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..valid()
        };
        let summary = config.summary();

        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("first data within 15s"));
        assert!(summary.contains("Stations: built-in"));
    }

    #[test]
    fn test_settings_follow_config() {
        let config = Config {
            ffmpeg_path: Some("/srv/ffmpeg".into()),
            ffmpeg_search_paths: vec![],
            transcode_timeout: Duration::from_secs(30),
            max_redirects: 3,
            ..valid()
        };

        let transcode = config.transcode_settings();
        assert_eq!(transcode.locators[0], DecoderLocator::Explicit("/srv/ffmpeg".into()));
        assert_eq!(transcode.locators[1], DecoderLocator::PathLookup("ffmpeg".into()));
        assert_eq!(transcode.first_data_timeout, Duration::from_secs(30));
        assert_eq!(config.fetch_settings().max_redirects, 3);
        assert_eq!(config.player_settings().ready_timeout, Duration::from_secs(20));
    }
}
