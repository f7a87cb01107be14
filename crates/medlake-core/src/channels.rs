use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::messages::ChannelName;
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Public channel identifier, with or without a leading `@`.
    pub name: String,
    /// Per-channel override of the collector's message limit.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ChannelConfig {
    /// The normalized channel name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the name is not a valid channel name.
    pub fn channel_name(&self) -> Result<ChannelName, ConfigError> {
        ChannelName::parse(&self.name).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelsFile {
    pub channels: Vec<ChannelConfig>,
}

/// Load and validate the channel list from a YAML file.
///
/// Order is preserved; the collector visits channels in file order.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_channels(path: &Path) -> Result<ChannelsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ChannelsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_channels(&content)
}

fn parse_channels(content: &str) -> Result<ChannelsFile, ConfigError> {
    let channels_file: ChannelsFile =
        serde_yaml::from_str(content).map_err(ConfigError::ChannelsFileParse)?;

    validate_channels(&channels_file)?;

    Ok(channels_file)
}

fn validate_channels(channels_file: &ChannelsFile) -> Result<(), ConfigError> {
    if channels_file.channels.is_empty() {
        return Err(ConfigError::Validation(
            "at least one channel must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();

    for channel in &channels_file.channels {
        let name = channel.channel_name()?;

        if channel.limit == Some(0) {
            return Err(ConfigError::Validation(format!(
                "channel '{name}' has limit 0; must be at least 1"
            )));
        }

        if !seen.insert(name.as_str().to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate channel: '{}'",
                channel.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "channels_test.rs"]
mod tests;
