use serde::{Deserialize, Serialize};

/// Top-level configuration for the battle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    /// Period of the main capture/analyze/decide cycle in milliseconds.
    pub cycle_interval_ms: u64,
    /// Period of the counter-attack watcher in milliseconds.
    pub watcher_interval_ms: u64,
    /// Period of the adaptive-tactic watcher in milliseconds.
    pub adaptive_interval_ms: u64,
    /// Boost local EQ against the opponent's weak and strong bands each cycle.
    pub auto_counter_eq: bool,
    /// Step local loudness up to match the opponent's measured level.
    pub auto_volume_match: bool,
    /// Produce counter-song suggestions from the rating index each cycle.
    pub song_suggestions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            cycle_interval_ms: 100,
            watcher_interval_ms: 200,
            adaptive_interval_ms: 500,
            auto_counter_eq: true,
            auto_volume_match: true,
            song_suggestions: false,
        }
    }
}

/// Configuration for the audio capture source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    /// Samples per analysis block. The default covers one 100 ms cycle at
    /// 48 kHz so each tick analyses exactly the audio since the previous one.
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 4_800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_covers_one_cycle() {
        let config = EngineConfig::default();
        let samples_per_ms = config.capture.sample_rate as u64 / 1000;
        assert_eq!(
            config.capture.block_size as u64,
            samples_per_ms * config.cycle_interval_ms
        );
    }
}
