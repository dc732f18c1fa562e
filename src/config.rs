// ABOUTME: Shared configuration surface for both the client session engine and
// ABOUTME: the server registry -- MTU, idle timeout, stats interval, framing options

use std::time::Duration;

use crate::frame::FramedConfig;

/// Tuning knobs shared by the client session engine and the server registry.
///
/// Follows the same builder shape as the keep-alive configuration: a
/// `Default` impl with sensible values, and fluent `with_*` setters that
/// consume and return `Self`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum IP packet size. Sizes every transport buffer.
    pub mtu: usize,

    /// After this long without successful I/O, a transport is considered
    /// dead; on the server, the logical client is forgotten too.
    pub idle_timeout: Duration,

    /// Period of the stats reporter.
    pub stats_interval: Duration,

    /// Size, in bytes, of the server's shared packet buffer pool.
    pub buffer_pool_size: usize,

    /// Selects the 4-byte frame header instead of the default 2-byte one.
    pub big_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mtu: 65535,
            idle_timeout: Duration::from_secs(70),
            stats_interval: Duration::from_secs(5),
            buffer_pool_size: 1024 * 1024,
            big_frames: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_stats_interval(mut self, stats_interval: Duration) -> Self {
        self.stats_interval = stats_interval;
        self
    }

    pub fn with_buffer_pool_size(mut self, buffer_pool_size: usize) -> Self {
        self.buffer_pool_size = buffer_pool_size;
        self
    }

    pub fn with_big_frames(mut self, big_frames: bool) -> Self {
        self.big_frames = big_frames;
        self
    }

    pub fn framed_config(&self) -> FramedConfig {
        let framed = FramedConfig::default().with_buffer_capacity(self.mtu.min(64 * 1024) + 64);
        if self.big_frames {
            framed.big_frames()
        } else {
            framed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.mtu, 65535);
        assert_eq!(config.idle_timeout, Duration::from_secs(70));
        assert_eq!(config.stats_interval, Duration::from_secs(5));
        assert!(!config.big_frames);
    }

    #[test]
    fn builder_chains_apply_in_order() {
        let config = Config::new()
            .with_mtu(1500)
            .with_idle_timeout(Duration::from_secs(30))
            .with_big_frames(true);

        assert_eq!(config.mtu, 1500);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert!(config.big_frames);
    }
}
