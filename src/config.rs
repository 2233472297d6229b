use crate::audio::AudioFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "voicememo";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Library directory; defaults to the per-user document root
    #[serde(default)]
    pub audio_dir: Option<String>,

    /// Where takes are written before they are saved; defaults to the system temp dir
    #[serde(default)]
    pub capture_dir: Option<String>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_waveform_bars")]
    pub waveform_bars: usize,

    #[serde(default = "default_waveform_interval_ms")]
    pub waveform_interval_ms: u64,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    1
}

fn default_status_interval_ms() -> u64 {
    250
}

fn default_waveform_bars() -> usize {
    12
}

fn default_waveform_interval_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio_dir: None,
            capture_dir: None,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            status_interval_ms: default_status_interval_ms(),
            waveform_bars: default_waveform_bars(),
            waveform_interval_ms: default_waveform_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/voicememo/config.json)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// Resolved library directory
    pub fn audio_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.audio_dir {
            return Ok(PathBuf::from(dir));
        }

        let data_dir = if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".local").join("share")
        };

        Ok(data_dir.join(APP_DIR).join("audio"))
    }

    pub fn capture_dir(&self) -> PathBuf {
        match &self.capture_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join(APP_DIR),
        }
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn waveform_interval(&self) -> Duration {
        Duration::from_millis(self.waveform_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(anyhow::anyhow!("sample_rate cannot be 0"));
        }

        if !(1..=2).contains(&self.channels) {
            return Err(anyhow::anyhow!("channels must be 1 or 2"));
        }

        if !(50..=1000).contains(&self.status_interval_ms) {
            return Err(anyhow::anyhow!(
                "status_interval_ms must be between 50 and 1000"
            ));
        }

        if self.waveform_bars == 0 {
            return Err(anyhow::anyhow!("waveform_bars cannot be 0"));
        }

        if self.waveform_interval_ms == 0 {
            return Err(anyhow::anyhow!("waveform_interval_ms cannot be 0"));
        }

        if matches!(&self.audio_dir, Some(dir) if dir.trim().is_empty()) {
            return Err(anyhow::anyhow!("audio_dir cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "audio_dir": "/srv/memos", "channels": 2 }"#).unwrap();

        assert_eq!(config.audio_dir().unwrap(), PathBuf::from("/srv/memos"));
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.status_interval(), Duration::from_millis(250));
        assert_eq!(config.waveform_bars, 12);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Config {
                sample_rate: 0,
                ..Config::default()
            },
            Config {
                channels: 3,
                ..Config::default()
            },
            Config {
                status_interval_ms: 5000,
                ..Config::default()
            },
            Config {
                waveform_bars: 0,
                ..Config::default()
            },
            Config {
                audio_dir: Some("  ".into()),
                ..Config::default()
            },
        ];

        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }
}
