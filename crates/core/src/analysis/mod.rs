use serde::{Deserialize, Serialize};

/// Band energy below this value counts as weak.
pub const WEAK_BAND_THRESHOLD: f32 = 0.3;
/// Band energy above this value counts as strong.
pub const STRONG_BAND_THRESHOLD: f32 = 0.7;
/// Overall-level delta between cycles that flags a transition.
pub const TRANSITION_THRESHOLD: f32 = 15.0;
/// Upper clamp for the dB-like overall level.
pub const MAX_OVERALL_LEVEL: f32 = 140.0;

/// The six coarse bands the analyzer reports, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    SubBass,
    Bass,
    LowMid,
    Mid,
    HighMid,
    High,
}

impl Band {
    pub const ALL: [Band; 6] = [
        Band::SubBass,
        Band::Bass,
        Band::LowMid,
        Band::Mid,
        Band::HighMid,
        Band::High,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Band::SubBass => "sub-bass",
            Band::Bass => "bass",
            Band::LowMid => "low-mid",
            Band::Mid => "mid",
            Band::HighMid => "high-mid",
            Band::High => "high",
        }
    }

    /// Index of this band within [`FrequencyAnalysis::bands`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Maps the six analysis bands onto the five local EQ slots. The top two
    /// bands share the highest slot.
    pub fn eq_slot(self) -> usize {
        match self {
            Band::SubBass => 0,
            Band::Bass => 1,
            Band::LowMid => 2,
            Band::Mid => 3,
            Band::HighMid => 4,
            Band::High => 4,
        }
    }

    /// The band that perceptually masks this one: the next band down, with
    /// sub-bass masking itself since nothing sits below it.
    pub fn masking_band(self) -> Band {
        match self {
            Band::SubBass => Band::SubBass,
            Band::Bass => Band::SubBass,
            Band::LowMid => Band::Bass,
            Band::Mid => Band::LowMid,
            Band::HighMid => Band::Mid,
            Band::High => Band::HighMid,
        }
    }
}

/// Immutable per-cycle snapshot of the opponent's sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyAnalysis {
    /// Loudness proxy derived from block RMS, clamped to [0, 140].
    pub overall_level: f32,
    /// Six band energies in [0, 1], ordered sub-bass to high.
    pub bands: [f32; 6],
    /// Bands with energy below [`WEAK_BAND_THRESHOLD`].
    pub weak_bands: Vec<Band>,
    /// Bands with energy above [`STRONG_BAND_THRESHOLD`].
    pub strong_bands: Vec<Band>,
    /// True when the overall level moved more than 15 since the last cycle.
    pub is_transitioning: bool,
    /// Milliseconds since the analyzer was created.
    pub timestamp_ms: u64,
}

impl FrequencyAnalysis {
    /// Builds a snapshot from raw measurements, deriving the weak/strong sets.
    pub fn from_levels(
        overall_level: f32,
        bands: [f32; 6],
        is_transitioning: bool,
        timestamp_ms: u64,
    ) -> Self {
        let mut weak_bands = Vec::new();
        let mut strong_bands = Vec::new();
        for band in Band::ALL {
            let energy = bands[band.index()];
            if energy < WEAK_BAND_THRESHOLD {
                weak_bands.push(band);
            } else if energy > STRONG_BAND_THRESHOLD {
                strong_bands.push(band);
            }
        }

        Self {
            overall_level: overall_level.clamp(0.0, MAX_OVERALL_LEVEL),
            bands,
            weak_bands,
            strong_bands,
            is_transitioning,
            timestamp_ms,
        }
    }

    /// All-zero snapshot used when capture produced nothing.
    pub fn silent(timestamp_ms: u64) -> Self {
        Self::from_levels(0.0, [0.0; 6], false, timestamp_ms)
    }
}

/// Same classification as [`FrequencyAnalysis::silent`]: all six bands of a
/// zero snapshot count as weak, so consumers that read an analysis before the
/// first cycle see silence, not an unclassified blank.
impl Default for FrequencyAnalysis {
    fn default() -> Self {
        Self::silent(0)
    }
}

impl FrequencyAnalysis {
    pub fn band(&self, band: Band) -> f32 {
        self.bands[band.index()]
    }

    pub fn is_weak(&self, band: Band) -> bool {
        self.weak_bands.contains(&band)
    }

    pub fn is_strong(&self, band: Band) -> bool {
        self.strong_bands.contains(&band)
    }

    /// First strong band, lowest first — the opponent's "battle zone".
    pub fn battle_zone(&self) -> Option<Band> {
        self.strong_bands.first().copied()
    }
}

/// Coarse band/loudness analyzer.
///
/// The six "bands" are mean absolute amplitudes of six contiguous equal
/// time-domain segments of the block, not a true frequency decomposition.
/// This is the heuristic the system was tuned around and is kept as-is; the
/// [`FrequencyAnalysis`] contract would not change if a real filter bank
/// replaced it.
#[derive(Debug)]
pub struct SpectralBandAnalyzer {
    previous_level: f32,
    started: std::time::Instant,
}

impl SpectralBandAnalyzer {
    pub fn new() -> Self {
        Self {
            previous_level: 0.0,
            started: std::time::Instant::now(),
        }
    }

    /// Analyses one sample block. Never fails: an empty block yields a
    /// zero-valued snapshot (and resets the transition baseline to silence).
    pub fn analyze(&mut self, block: &[f32]) -> FrequencyAnalysis {
        let now_ms = self.started.elapsed().as_millis() as u64;
        self.analyze_at(block, now_ms)
    }

    pub(crate) fn analyze_at(&mut self, block: &[f32], now_ms: u64) -> FrequencyAnalysis {
        if block.is_empty() {
            self.previous_level = 0.0;
            return FrequencyAnalysis::silent(now_ms);
        }

        let overall_level = overall_level(block);
        let bands = band_energies(block);
        let is_transitioning = (overall_level - self.previous_level).abs() > TRANSITION_THRESHOLD;
        self.previous_level = overall_level;

        FrequencyAnalysis::from_levels(overall_level, bands, is_transitioning, now_ms)
    }
}

impl Default for SpectralBandAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS mapped onto the dB-like [0, 140] scale. Full scale is 1.0 for float
/// samples, so a full-scale sine lands at ~87 and silence clamps to 0.
fn overall_level(block: &[f32]) -> f32 {
    let sum: f32 = block.iter().map(|sample| sample * sample).sum();
    let rms = (sum / block.len() as f32).sqrt();
    if rms <= f32::EPSILON {
        return 0.0;
    }
    (20.0 * rms.log10() + 90.0).clamp(0.0, MAX_OVERALL_LEVEL)
}

/// Mean absolute amplitude of six contiguous equal-length segments, clamped
/// to [0, 1]. Blocks shorter than six samples fold into the first segments.
fn band_energies(block: &[f32]) -> [f32; 6] {
    let mut bands = [0.0_f32; 6];
    let segment_len = (block.len() / 6).max(1);

    for (index, segment) in block.chunks(segment_len).take(6).enumerate() {
        let sum: f32 = segment.iter().map(|sample| sample.abs()).sum();
        bands[index] = (sum / segment.len() as f32).clamp(0.0, 1.0);
    }

    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 600-sample block whose six 100-sample segments hold the given
    /// constant amplitudes.
    fn segment_block(levels: [f32; 6]) -> Vec<f32> {
        let mut block = Vec::with_capacity(600);
        for level in levels {
            block.extend(std::iter::repeat(level).take(100));
        }
        block
    }

    #[test]
    fn default_snapshot_classifies_like_silence() {
        let analysis = FrequencyAnalysis::default();
        assert_eq!(analysis.overall_level, 0.0);
        assert_eq!(analysis.weak_bands.len(), 6);
        assert!(analysis.strong_bands.is_empty());
    }

    #[test]
    fn empty_block_yields_silent_analysis() {
        let mut analyzer = SpectralBandAnalyzer::new();
        let analysis = analyzer.analyze(&[]);

        assert_eq!(analysis.overall_level, 0.0);
        assert_eq!(analysis.bands, [0.0; 6]);
        assert!(analysis.weak_bands.len() == 6);
        assert!(analysis.strong_bands.is_empty());
        assert!(!analysis.is_transitioning);
    }

    #[test]
    fn classifies_weak_and_strong_bands() {
        let mut analyzer = SpectralBandAnalyzer::new();
        let block = segment_block([0.9, 0.8, 0.5, 0.1, 0.2, 0.95]);
        let analysis = analyzer.analyze(&block);

        assert_eq!(
            analysis.strong_bands,
            vec![Band::SubBass, Band::Bass, Band::High]
        );
        assert_eq!(analysis.weak_bands, vec![Band::Mid, Band::HighMid]);
        assert!(analysis.is_strong(Band::SubBass));
        assert!(analysis.is_weak(Band::Mid));
        assert_eq!(analysis.battle_zone(), Some(Band::SubBass));
    }

    #[test]
    fn overall_level_tracks_amplitude() {
        let mut analyzer = SpectralBandAnalyzer::new();
        let loud = analyzer.analyze(&vec![0.5; 600]).overall_level;
        let quiet = analyzer.analyze(&vec![0.01; 600]).overall_level;

        assert!(loud > quiet);
        assert!(loud <= MAX_OVERALL_LEVEL);
        assert!(quiet >= 0.0);
        // 0.5 RMS is -6 dBFS, so ~84 on the shifted scale.
        assert!((loud - 84.0).abs() < 1.0);
    }

    #[test]
    fn transition_flag_follows_level_jumps() {
        let mut analyzer = SpectralBandAnalyzer::new();
        let loud = vec![0.5; 600];
        let quiet = vec![0.005; 600];

        let first = analyzer.analyze(&loud);
        assert!(first.is_transitioning); // from the 0.0 baseline

        let steady = analyzer.analyze(&loud);
        assert!(!steady.is_transitioning);

        let drop = analyzer.analyze(&quiet);
        assert!(drop.is_transitioning);
    }

    #[test]
    fn band_mapping_tables_are_fixed() {
        assert_eq!(Band::SubBass.masking_band(), Band::SubBass);
        assert_eq!(Band::High.masking_band(), Band::HighMid);
        assert_eq!(Band::SubBass.eq_slot(), 0);
        assert_eq!(Band::HighMid.eq_slot(), 4);
        assert_eq!(Band::High.eq_slot(), 4);
    }
}
