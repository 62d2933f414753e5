//! Frame pacing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ACQUIRE_TIMEOUT_NS, DEFAULT_FENCE_TIMEOUT_NS, FRAME_OVERLAP};
use crate::error::{Error, Result};

/// Parameters of the frame ring and its waits.
///
/// The overlap is fixed for the lifetime of a ring; changing it requires
/// shutting the ring down and building a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of frame slots in the ring.
    pub frame_overlap: usize,
    /// Bound on each fence wait before the GPU is presumed lost.
    pub fence_timeout_ns: u64,
    /// Bound handed to the swapchain when acquiring an image.
    pub acquire_timeout_ns: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_overlap: FRAME_OVERLAP,
            fence_timeout_ns: DEFAULT_FENCE_TIMEOUT_NS,
            acquire_timeout_ns: DEFAULT_ACQUIRE_TIMEOUT_NS,
        }
    }
}

impl FrameConfig {
    /// Set the number of frame slots.
    #[must_use]
    pub const fn with_frame_overlap(mut self, frame_overlap: usize) -> Self {
        self.frame_overlap = frame_overlap;
        self
    }

    /// Set the fence wait bound.
    #[must_use]
    pub const fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout_ns = saturating_nanos(timeout);
        self
    }

    /// Set the acquire bound.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ns = saturating_nanos(timeout);
        self
    }

    /// Fence wait bound as a [`Duration`].
    pub const fn fence_timeout(&self) -> Duration {
        Duration::from_nanos(self.fence_timeout_ns)
    }

    /// Acquire bound as a [`Duration`].
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_nanos(self.acquire_timeout_ns)
    }

    /// Check the configuration before any GPU object is created.
    pub fn validate(&self) -> Result<()> {
        if self.frame_overlap == 0 {
            return Err(Error::InvalidConfig(
                "frame_overlap must be at least 1".to_string(),
            ));
        }
        if self.fence_timeout_ns == 0 {
            return Err(Error::InvalidConfig(
                "fence_timeout_ns must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

const fn saturating_nanos(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    if nanos > u64::MAX as u128 {
        u64::MAX
    } else {
        nanos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = FrameConfig::default();
        assert_eq!(config.frame_overlap, 2);
        assert_eq!(config.fence_timeout(), Duration::from_secs(1));
        assert_eq!(config.acquire_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_overlap_rejected() {
        let config = FrameConfig::default().with_frame_overlap(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_fence_timeout_rejected() {
        let config = FrameConfig::default().with_fence_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_timeout_saturates() {
        let config = FrameConfig::default().with_acquire_timeout(Duration::MAX);
        assert_eq!(config.acquire_timeout_ns, u64::MAX);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: FrameConfig = toml::from_str("frame_overlap = 3").unwrap();
        assert_eq!(config.frame_overlap, 3);
        assert_eq!(config.fence_timeout_ns, DEFAULT_FENCE_TIMEOUT_NS);
        assert_eq!(config.acquire_timeout_ns, DEFAULT_ACQUIRE_TIMEOUT_NS);

        let empty: FrameConfig = toml::from_str("").unwrap();
        assert_eq!(empty, FrameConfig::default());
    }

    #[test]
    fn config_survives_toml() {
        let config = FrameConfig::default()
            .with_frame_overlap(3)
            .with_fence_timeout(Duration::from_millis(250));
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("fence_timeout_ns = 250000000"));

        let parsed: FrameConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert!(parsed.validate().is_ok());
    }
}
