//! Backend configuration

use crate::capture::DEFAULT_JPEG_QUALITY;
use crate::error::{Error, Result};
use crate::publisher::PublishStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// X11 display name; `$DISPLAY` when unset
    pub display: Option<String>,
    /// Sleep between two drains of the event queue
    pub poll_interval_ms: u64,
    /// How long the publisher worker waits for work before exiting
    pub publisher_idle_ms: u64,
    pub publish_strategy: PublishStrategy,
    /// Use MIT-SHM for screenshots when the server supports it
    pub use_shm: bool,
    pub jpeg_quality: u8,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            display: None,
            poll_interval_ms: 100,
            publisher_idle_ms: 10_000,
            publish_strategy: PublishStrategy::Queued,
            use_shm: true,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl BackendConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be positive"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::InvalidConfig("jpeg_quality must be between 1 and 100"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn publisher_idle(&self) -> Duration {
        Duration::from_millis(self.publisher_idle_ms)
    }
}
