use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Number of local EQ slots the device exposes.
pub const EQ_SLOT_COUNT: usize = 5;
/// Nominal centre frequencies of the five EQ slots.
pub const EQ_SLOT_LABELS: [&str; EQ_SLOT_COUNT] = ["60 Hz", "230 Hz", "910 Hz", "3.6 kHz", "14 kHz"];
/// Number of quick-profile slots available for instant recall.
pub const QUICK_PROFILE_SLOTS: usize = 4;
/// EQ slot used as the "presence" band by tactics and auto-counter rules.
pub const PRESENCE_SLOT: usize = 3;
/// EQ slot used as the "air" band by tactics and auto-counter rules.
pub const AIR_SLOT: usize = 4;
/// Ceiling the limiter is held to while hardware protection is on, in dB.
pub const PROTECTED_CEILING_DB: f32 = -0.5;

/// Device-reported gain range for one EQ slot, in millibels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqBandRange {
    pub min_mb: i32,
    pub max_mb: i32,
}

impl EqBandRange {
    pub fn clamp(&self, millibels: i32) -> i32 {
        millibels.clamp(self.min_mb, self.max_mb)
    }
}

impl Default for EqBandRange {
    fn default() -> Self {
        Self {
            min_mb: -1500,
            max_mb: 1500,
        }
    }
}

/// Compressor parameters. Defaults follow the punch-compressor tuning the
/// battle chain ships with: −10 dB threshold, 4:1, 3 ms attack, 300 ms
/// release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorSettings {
    pub enabled: bool,
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_gain_db: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_db: -10.0,
            ratio: 4.0,
            attack_ms: 3.0,
            release_ms: 300.0,
            makeup_gain_db: 0.0,
        }
    }
}

impl CompressorSettings {
    fn clamped(mut self) -> Self {
        self.threshold_db = self.threshold_db.clamp(-60.0, 0.0);
        self.ratio = self.ratio.clamp(1.0, 20.0);
        self.attack_ms = self.attack_ms.clamp(0.1, 200.0);
        self.release_ms = self.release_ms.clamp(10.0, 1000.0);
        self.makeup_gain_db = self.makeup_gain_db.clamp(0.0, 24.0);
        self
    }
}

/// Limiter parameters. Defaults are the battle limiter's: −0.3 dB threshold,
/// −0.1 dB ceiling, 100 ms release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    pub enabled: bool,
    pub threshold_db: f32,
    pub ceiling_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -0.3,
            ceiling_db: -0.1,
            attack_ms: 1.0,
            release_ms: 100.0,
        }
    }
}

impl LimiterSettings {
    fn clamped(mut self, hardware_protection: bool) -> Self {
        self.threshold_db = self.threshold_db.clamp(-12.0, 0.0);
        let ceiling_max = if hardware_protection {
            PROTECTED_CEILING_DB
        } else {
            0.0
        };
        self.ceiling_db = self.ceiling_db.clamp(-3.0, ceiling_max);
        self.attack_ms = self.attack_ms.clamp(0.1, 10.0);
        self.release_ms = self.release_ms.clamp(10.0, 500.0);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StereoWidthSettings {
    pub enabled: bool,
    pub width: i32,
}

impl Default for StereoWidthSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExciterSettings {
    pub enabled: bool,
    pub drive: i32,
    pub mix: i32,
}

impl Default for ExciterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            drive: 0,
            mix: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReverbSettings {
    pub enabled: bool,
    pub preset: u8,
}

/// Canonical snapshot of the whole local effect chain. Every field is kept
/// inside its declared range by the [`EffectRack`] setters; the struct itself
/// is plain data so it can be published, saved, and diffed freely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectState {
    pub bass: i32,
    pub loudness: i32,
    pub clarity: i32,
    pub spatial: i32,
    pub eq_bands: [i32; EQ_SLOT_COUNT],
    pub compressor: CompressorSettings,
    pub limiter: LimiterSettings,
    pub stereo: StereoWidthSettings,
    pub exciter: ExciterSettings,
    pub reverb: ReverbSettings,
    /// While set, the limiter is forwarded and reported as disabled no matter
    /// what `limiter.enabled` says.
    pub danger_mode: bool,
}

impl EffectState {
    /// Whether the limiter is actually in circuit, accounting for danger mode.
    pub fn limiter_engaged(&self) -> bool {
        self.limiter.enabled && !self.danger_mode
    }

    /// Rough dB-like estimate of our own output level, used by the momentum
    /// tracker to compare against the opponent's measured level. Spans
    /// 70 (everything flat) to 110 (loudness and bass maxed).
    pub fn estimated_output_level(&self) -> f32 {
        70.0 + self.loudness as f32 * 0.03 + self.bass as f32 * 0.01
    }
}

/// Derived display metadata for one EQ slot, recomputed on every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandDisplay {
    pub label: &'static str,
    pub gain_db: f32,
}

/// Named snapshot of the tonal subset of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub bass: i32,
    pub loudness: i32,
    pub clarity: i32,
    pub spatial: i32,
    pub eq_bands: [i32; EQ_SLOT_COUNT],
}

/// Full-chain snapshot stored in one of the numbered quick slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickProfile {
    pub state: EffectState,
}

/// Strategic effect postures selectable as a whole. Each maps to a fixed
/// (bass, loudness, EQ curve, spatial) tuple; `Off` drops the entire chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleMode {
    Off,
    BassWarfare,
    ClarityStrike,
    FullAssault,
    SplMonster,
    CrowdReach,
    MaximumImpact,
    BalancedBattle,
    IndoorBattle,
}

impl BattleMode {
    /// (bass, loudness, eq curve in millibels, spatial) for every mode except
    /// `Off`, which is handled as a full reset.
    fn recipe(self) -> Option<(i32, i32, [i32; EQ_SLOT_COUNT], i32)> {
        match self {
            BattleMode::Off => None,
            BattleMode::BassWarfare => Some((1000, 800, [1500, 1200, 300, 0, -200], 400)),
            BattleMode::ClarityStrike => Some((300, 700, [-200, 0, 400, 1200, 1000], 600)),
            BattleMode::FullAssault => Some((900, 950, [1200, 1000, 800, 1000, 900], 700)),
            BattleMode::SplMonster => Some((1000, 1000, [1500, 1300, 600, 400, 300], 200)),
            BattleMode::CrowdReach => Some((700, 850, [800, 600, 400, 800, 1000], 1000)),
            BattleMode::MaximumImpact => Some((1000, 1000, [1500, 1200, 700, 1100, 1000], 800)),
            BattleMode::BalancedBattle => Some((600, 700, [600, 500, 400, 500, 500], 500)),
            BattleMode::IndoorBattle => Some((500, 600, [400, 300, 200, 400, 300], 300)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BattleMode::Off => "off",
            BattleMode::BassWarfare => "bass warfare",
            BattleMode::ClarityStrike => "clarity strike",
            BattleMode::FullAssault => "full assault",
            BattleMode::SplMonster => "SPL monster",
            BattleMode::CrowdReach => "crowd reach",
            BattleMode::MaximumImpact => "maximum impact",
            BattleMode::BalancedBattle => "balanced battle",
            BattleMode::IndoorBattle => "indoor battle",
        }
    }
}

/// Interface to the hardware effect chain. Every mutation of the rack is
/// forwarded through one of these calls; implementations may fail on
/// unsupported features and the rack will log and carry on.
pub trait EffectSink: Send {
    fn set_bass(&mut self, level: i32) -> Result<()>;
    fn set_loudness(&mut self, level: i32) -> Result<()>;
    fn set_clarity(&mut self, level: i32) -> Result<()>;
    fn set_eq_band(&mut self, slot: usize, millibels: i32) -> Result<()>;
    fn set_virtualizer(&mut self, level: i32) -> Result<()>;
    fn set_compressor(&mut self, settings: &CompressorSettings) -> Result<()>;
    /// `engaged` carries the danger-mode-adjusted on/off state.
    fn set_limiter(&mut self, settings: &LimiterSettings, engaged: bool) -> Result<()>;
    fn set_stereo_width(&mut self, settings: &StereoWidthSettings) -> Result<()>;
    fn set_exciter(&mut self, settings: &ExciterSettings) -> Result<()>;
    fn set_reverb(&mut self, preset: u8, enabled: bool) -> Result<()>;
}

/// Sink that accepts everything and does nothing. Stands in for the hardware
/// chain in tests and in simulated battles.
#[derive(Debug, Default)]
pub struct NullSink;

impl EffectSink for NullSink {
    fn set_bass(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }
    fn set_loudness(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }
    fn set_clarity(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }
    fn set_eq_band(&mut self, _slot: usize, _millibels: i32) -> Result<()> {
        Ok(())
    }
    fn set_virtualizer(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }
    fn set_compressor(&mut self, _settings: &CompressorSettings) -> Result<()> {
        Ok(())
    }
    fn set_limiter(&mut self, _settings: &LimiterSettings, _engaged: bool) -> Result<()> {
        Ok(())
    }
    fn set_stereo_width(&mut self, _settings: &StereoWidthSettings) -> Result<()> {
        Ok(())
    }
    fn set_exciter(&mut self, _settings: &ExciterSettings) -> Result<()> {
        Ok(())
    }
    fn set_reverb(&mut self, _preset: u8, _enabled: bool) -> Result<()> {
        Ok(())
    }
}

/// Owner of the canonical [`EffectState`]. All writes clamp at the point of
/// write (out-of-range input is never an error), refresh the derived display
/// metadata, and forward to the sink; sink failures are logged and dropped.
pub struct EffectRack {
    state: EffectState,
    eq_ranges: [EqBandRange; EQ_SLOT_COUNT],
    display: [BandDisplay; EQ_SLOT_COUNT],
    presets: HashMap<String, Preset>,
    quick_profiles: [Option<QuickProfile>; QUICK_PROFILE_SLOTS],
    hardware_protection: bool,
    sink: Box<dyn EffectSink>,
}

impl EffectRack {
    pub fn new(sink: Box<dyn EffectSink>) -> Self {
        Self::with_eq_ranges(sink, [EqBandRange::default(); EQ_SLOT_COUNT])
    }

    /// Builds a rack against device-reported EQ ranges.
    pub fn with_eq_ranges(
        sink: Box<dyn EffectSink>,
        eq_ranges: [EqBandRange; EQ_SLOT_COUNT],
    ) -> Self {
        let state = EffectState::default();
        let display = compute_display(&state.eq_bands);
        Self {
            state,
            eq_ranges,
            display,
            presets: HashMap::new(),
            quick_profiles: Default::default(),
            hardware_protection: true,
            sink,
        }
    }

    pub fn state(&self) -> &EffectState {
        &self.state
    }

    pub fn display(&self) -> &[BandDisplay; EQ_SLOT_COUNT] {
        &self.display
    }

    pub fn eq_range(&self, slot: usize) -> EqBandRange {
        self.eq_ranges[slot.min(EQ_SLOT_COUNT - 1)]
    }

    pub fn hardware_protection(&self) -> bool {
        self.hardware_protection
    }

    // --- scalar setters -------------------------------------------------

    pub fn set_bass(&mut self, level: i32) {
        self.state.bass = level.clamp(0, 1000);
        let level = self.state.bass;
        self.forward(|sink| sink.set_bass(level));
    }

    pub fn set_loudness(&mut self, level: i32) {
        self.state.loudness = level.clamp(0, 1000);
        let level = self.state.loudness;
        self.forward(|sink| sink.set_loudness(level));
    }

    pub fn set_clarity(&mut self, level: i32) {
        self.state.clarity = level.clamp(0, 100);
        let level = self.state.clarity;
        self.forward(|sink| sink.set_clarity(level));
    }

    pub fn set_spatial(&mut self, level: i32) {
        self.state.spatial = level.clamp(0, 1000);
        let level = self.state.spatial;
        self.forward(|sink| sink.set_virtualizer(level));
    }

    pub fn adjust_bass(&mut self, delta: i32) {
        self.set_bass(self.state.bass.saturating_add(delta));
    }

    pub fn adjust_loudness(&mut self, delta: i32) {
        self.set_loudness(self.state.loudness.saturating_add(delta));
    }

    pub fn set_eq_band(&mut self, slot: usize, millibels: i32) {
        let slot = slot.min(EQ_SLOT_COUNT - 1);
        self.state.eq_bands[slot] = self.eq_ranges[slot].clamp(millibels);
        let value = self.state.eq_bands[slot];
        self.display = compute_display(&self.state.eq_bands);
        self.forward(|sink| sink.set_eq_band(slot, value));
    }

    pub fn adjust_eq_band(&mut self, slot: usize, delta_mb: i32) {
        let slot = slot.min(EQ_SLOT_COUNT - 1);
        self.set_eq_band(slot, self.state.eq_bands[slot].saturating_add(delta_mb));
    }

    // --- processor setters ----------------------------------------------

    pub fn set_compressor(&mut self, settings: CompressorSettings) {
        self.state.compressor = settings.clamped();
        let settings = self.state.compressor;
        self.forward(|sink| sink.set_compressor(&settings));
    }

    pub fn set_compressor_enabled(&mut self, enabled: bool) {
        let mut settings = self.state.compressor;
        settings.enabled = enabled;
        self.set_compressor(settings);
    }

    pub fn set_limiter(&mut self, settings: LimiterSettings) {
        self.state.limiter = settings.clamped(self.hardware_protection);
        self.forward_limiter();
    }

    pub fn set_limiter_enabled(&mut self, enabled: bool) {
        self.state.limiter.enabled = enabled;
        self.forward_limiter();
    }

    pub fn set_stereo_width(&mut self, enabled: bool, width: i32) {
        self.state.stereo = StereoWidthSettings {
            enabled,
            width: width.clamp(0, 200),
        };
        let settings = self.state.stereo;
        self.forward(|sink| sink.set_stereo_width(&settings));
    }

    pub fn set_exciter(&mut self, enabled: bool, drive: i32, mix: i32) {
        self.state.exciter = ExciterSettings {
            enabled,
            drive: drive.clamp(0, 100),
            mix: mix.clamp(0, 100),
        };
        let settings = self.state.exciter;
        self.forward(|sink| sink.set_exciter(&settings));
    }

    pub fn set_reverb(&mut self, enabled: bool, preset: u8) {
        self.state.reverb = ReverbSettings {
            enabled,
            preset: preset.min(6),
        };
        let reverb = self.state.reverb;
        self.forward(|sink| sink.set_reverb(reverb.preset, reverb.enabled));
    }

    /// Danger mode bypasses the limiter entirely while leaving its configured
    /// state untouched, so switching it off restores the previous behaviour.
    pub fn set_danger_mode(&mut self, enabled: bool) {
        if self.state.danger_mode == enabled {
            return;
        }
        self.state.danger_mode = enabled;
        if enabled {
            tracing::warn!("danger mode on: limiter bypassed");
        }
        self.forward_limiter();
    }

    /// While on, limiter ceiling writes are held at or below −0.5 dB.
    pub fn set_hardware_protection(&mut self, enabled: bool) {
        self.hardware_protection = enabled;
        // Re-clamp the stored ceiling against the new bound.
        let settings = self.state.limiter;
        self.set_limiter(settings);
    }

    // --- compound recipes -----------------------------------------------

    pub fn apply_battle_mode(&mut self, mode: BattleMode) {
        tracing::info!(mode = mode.label(), "applying battle mode");
        match mode.recipe() {
            None => {
                self.reset_all_to_defaults();
                self.set_loudness(0);
                self.set_compressor_enabled(false);
                self.set_limiter_enabled(false);
            }
            Some((bass, loudness, curve, spatial)) => {
                self.set_bass(bass);
                self.set_loudness(loudness);
                for (slot, millibels) in curve.into_iter().enumerate() {
                    self.set_eq_band(slot, millibels);
                }
                self.set_spatial(spatial);
                self.set_compressor_enabled(true);
                self.set_limiter_enabled(true);
            }
        }
    }

    pub fn emergency_bass_boost(&mut self) {
        self.set_bass(1000);
        self.set_loudness(800);
        self.set_eq_band(0, self.eq_ranges[0].max_mb);
        self.set_eq_band(1, self.eq_ranges[1].max_mb);
    }

    pub fn cut_through(&mut self) {
        self.set_clarity(100);
        self.set_spatial(800);
        self.set_eq_band(PRESENCE_SLOT, self.eq_ranges[PRESENCE_SLOT].max_mb);
        let air_max = self.eq_ranges[AIR_SLOT].max_mb;
        self.set_eq_band(AIR_SLOT, (air_max as f32 * 0.8) as i32);
    }

    pub fn go_nuclear(&mut self) {
        self.set_bass(1000);
        self.set_loudness(1000);
        self.set_clarity(100);
        self.set_spatial(1000);
        for slot in 0..EQ_SLOT_COUNT {
            self.set_eq_band(slot, self.eq_ranges[slot].max_mb);
        }
    }

    pub fn reset_all_to_defaults(&mut self) {
        self.apply_state(&EffectState::default());
    }

    // --- presets and quick profiles -------------------------------------

    pub fn save_preset(&mut self, name: &str) -> Preset {
        let preset = Preset {
            name: name.to_string(),
            bass: self.state.bass,
            loudness: self.state.loudness,
            clarity: self.state.clarity,
            spatial: self.state.spatial,
            eq_bands: self.state.eq_bands,
        };
        self.presets.insert(preset.name.clone(), preset.clone());
        preset
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    pub fn preset_names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    pub fn apply_preset(&mut self, preset: &Preset) {
        self.set_bass(preset.bass);
        self.set_loudness(preset.loudness);
        self.set_clarity(preset.clarity);
        self.set_spatial(preset.spatial);
        for (slot, millibels) in preset.eq_bands.into_iter().enumerate() {
            self.set_eq_band(slot, millibels);
        }
    }

    pub fn save_quick_profile(&mut self, slot: usize) {
        let slot = slot.min(QUICK_PROFILE_SLOTS - 1);
        self.quick_profiles[slot] = Some(QuickProfile {
            state: self.state.clone(),
        });
    }

    pub fn load_quick_profile(&mut self, slot: usize) {
        let slot = slot.min(QUICK_PROFILE_SLOTS - 1);
        if let Some(profile) = self.quick_profiles[slot].clone() {
            self.apply_state(&profile.state);
        }
    }

    pub fn clear_quick_profile(&mut self, slot: usize) {
        let slot = slot.min(QUICK_PROFILE_SLOTS - 1);
        self.quick_profiles[slot] = None;
    }

    pub fn quick_profile(&self, slot: usize) -> Option<&QuickProfile> {
        self.quick_profiles[slot.min(QUICK_PROFILE_SLOTS - 1)].as_ref()
    }

    // --- internals ------------------------------------------------------

    /// Routes a full snapshot through the clamped setters so every field is
    /// validated and forwarded.
    fn apply_state(&mut self, state: &EffectState) {
        self.set_bass(state.bass);
        self.set_loudness(state.loudness);
        self.set_clarity(state.clarity);
        self.set_spatial(state.spatial);
        for (slot, millibels) in state.eq_bands.into_iter().enumerate() {
            self.set_eq_band(slot, millibels);
        }
        self.set_compressor(state.compressor);
        self.set_limiter(state.limiter);
        self.set_stereo_width(state.stereo.enabled, state.stereo.width);
        self.set_exciter(state.exciter.enabled, state.exciter.drive, state.exciter.mix);
        self.set_reverb(state.reverb.enabled, state.reverb.preset);
        self.set_danger_mode(state.danger_mode);
    }

    fn forward_limiter(&mut self) {
        let settings = self.state.limiter;
        let engaged = self.state.limiter_engaged();
        self.forward(|sink| sink.set_limiter(&settings, engaged));
    }

    /// Pushes one update to the sink; rejections never propagate.
    fn forward(&mut self, call: impl FnOnce(&mut dyn EffectSink) -> Result<()>) {
        if let Err(err) = call(self.sink.as_mut()) {
            tracing::warn!(error = %err, "effect chain rejected update");
        }
    }
}

impl std::fmt::Debug for EffectRack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRack")
            .field("state", &self.state)
            .field("presets", &self.presets.len())
            .field("hardware_protection", &self.hardware_protection)
            .finish()
    }
}

fn compute_display(eq_bands: &[i32; EQ_SLOT_COUNT]) -> [BandDisplay; EQ_SLOT_COUNT] {
    let mut display = [BandDisplay {
        label: "",
        gain_db: 0.0,
    }; EQ_SLOT_COUNT];
    for slot in 0..EQ_SLOT_COUNT {
        display[slot] = BandDisplay {
            label: EQ_SLOT_LABELS[slot],
            gain_db: eq_bands[slot] as f32 / 100.0,
        };
    }
    display
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rack() -> EffectRack {
        EffectRack::new(Box::new(NullSink))
    }

    #[test]
    fn bass_clamps_and_is_idempotent() {
        let mut rack = rack();
        for level in [-500, 0, 500, 1000, 40_000] {
            rack.set_bass(level);
            let first = rack.state().bass;
            rack.set_bass(level);
            assert_eq!(rack.state().bass, first);
            assert!((0..=1000).contains(&first));
        }
    }

    #[test]
    fn eq_bands_stay_within_device_range() {
        let mut rack = EffectRack::with_eq_ranges(
            Box::new(NullSink),
            [EqBandRange {
                min_mb: -900,
                max_mb: 900,
            }; EQ_SLOT_COUNT],
        );

        rack.set_eq_band(0, 5000);
        rack.adjust_eq_band(0, 5000);
        rack.set_eq_band(3, -5000);
        rack.adjust_eq_band(2, -250);

        assert_eq!(rack.state().eq_bands[0], 900);
        assert_eq!(rack.state().eq_bands[3], -900);
        assert_eq!(rack.state().eq_bands[2], -250);
    }

    #[test]
    fn display_metadata_tracks_eq_writes() {
        let mut rack = rack();
        rack.set_eq_band(1, 1200);

        let display = rack.display();
        assert_eq!(display[1].label, "230 Hz");
        assert!((display[1].gain_db - 12.0).abs() < f32::EPSILON);
    }

    #[test]
    fn preset_round_trips_exactly() {
        let mut rack = rack();
        rack.set_bass(640);
        rack.set_loudness(512);
        rack.set_clarity(77);
        rack.set_spatial(333);
        rack.set_eq_band(0, 300);
        rack.set_eq_band(4, -450);

        let preset = rack.save_preset("x");
        rack.go_nuclear();
        rack.apply_preset(&preset);

        assert_eq!(rack.state().bass, 640);
        assert_eq!(rack.state().loudness, 512);
        assert_eq!(rack.state().clarity, 77);
        assert_eq!(rack.state().spatial, 333);
        assert_eq!(rack.state().eq_bands[0], 300);
        assert_eq!(rack.state().eq_bands[4], -450);
    }

    #[test]
    fn quick_profile_round_trips_the_full_chain() {
        let mut rack = rack();
        rack.set_bass(700);
        rack.set_compressor(CompressorSettings {
            enabled: true,
            threshold_db: -24.0,
            ratio: 8.0,
            attack_ms: 1.0,
            release_ms: 120.0,
            makeup_gain_db: 6.0,
        });
        rack.set_exciter(true, 40, 60);
        rack.save_quick_profile(2);

        rack.reset_all_to_defaults();
        assert_eq!(rack.state().bass, 0);
        assert!(!rack.state().compressor.enabled);

        rack.load_quick_profile(2);
        assert_eq!(rack.state().bass, 700);
        assert!(rack.state().compressor.enabled);
        assert_eq!(rack.state().compressor.ratio, 8.0);
        assert_eq!(rack.state().exciter.drive, 40);

        rack.clear_quick_profile(2);
        assert!(rack.quick_profile(2).is_none());
    }

    #[test]
    fn danger_mode_bypasses_limiter_reporting() {
        let mut rack = rack();
        rack.set_limiter_enabled(true);
        assert!(rack.state().limiter_engaged());

        rack.set_danger_mode(true);
        assert!(rack.state().limiter.enabled);
        assert!(!rack.state().limiter_engaged());

        rack.set_danger_mode(false);
        assert!(rack.state().limiter_engaged());
    }

    #[test]
    fn hardware_protection_holds_limiter_ceiling_down() {
        let mut rack = rack();
        let mut settings = rack.state().limiter;
        settings.ceiling_db = 0.0;
        rack.set_limiter(settings);
        assert!((rack.state().limiter.ceiling_db - PROTECTED_CEILING_DB).abs() < f32::EPSILON);

        rack.set_hardware_protection(false);
        let mut settings = rack.state().limiter;
        settings.ceiling_db = 0.0;
        rack.set_limiter(settings);
        assert_eq!(rack.state().limiter.ceiling_db, 0.0);
    }

    #[test]
    fn go_nuclear_maxes_the_chain() {
        let mut rack = rack();
        rack.go_nuclear();

        assert_eq!(rack.state().bass, 1000);
        assert_eq!(rack.state().loudness, 1000);
        assert_eq!(rack.state().clarity, 100);
        assert_eq!(rack.state().spatial, 1000);
        for slot in 0..EQ_SLOT_COUNT {
            assert_eq!(rack.state().eq_bands[slot], rack.eq_range(slot).max_mb);
        }
    }

    #[test]
    fn emergency_bass_boost_recipe() {
        let mut rack = rack();
        rack.emergency_bass_boost();

        assert_eq!(rack.state().bass, 1000);
        assert_eq!(rack.state().loudness, 800);
        assert_eq!(rack.state().eq_bands[0], rack.eq_range(0).max_mb);
        assert_eq!(rack.state().eq_bands[1], rack.eq_range(1).max_mb);
    }

    #[test]
    fn cut_through_recipe() {
        let mut rack = rack();
        rack.cut_through();

        assert_eq!(rack.state().clarity, 100);
        assert_eq!(rack.state().spatial, 800);
        assert_eq!(rack.state().eq_bands[PRESENCE_SLOT], 1500);
        assert_eq!(rack.state().eq_bands[AIR_SLOT], 1200);
    }

    #[test]
    fn battle_mode_off_drops_the_chain() {
        let mut rack = rack();
        rack.apply_battle_mode(BattleMode::SplMonster);
        assert_eq!(rack.state().bass, 1000);
        assert!(rack.state().compressor.enabled);

        rack.apply_battle_mode(BattleMode::Off);
        assert_eq!(rack.state().bass, 0);
        assert_eq!(rack.state().loudness, 0);
        assert_eq!(rack.state().eq_bands, [0; EQ_SLOT_COUNT]);
        assert!(!rack.state().compressor.enabled);
        assert!(!rack.state().limiter.enabled);
    }

    #[test]
    fn sink_rejection_is_swallowed() {
        struct RejectingSink;
        impl EffectSink for RejectingSink {
            fn set_bass(&mut self, _level: i32) -> Result<()> {
                Err(crate::DuelError::msg("unsupported"))
            }
            fn set_loudness(&mut self, _level: i32) -> Result<()> {
                Ok(())
            }
            fn set_clarity(&mut self, _level: i32) -> Result<()> {
                Ok(())
            }
            fn set_eq_band(&mut self, _slot: usize, _millibels: i32) -> Result<()> {
                Ok(())
            }
            fn set_virtualizer(&mut self, _level: i32) -> Result<()> {
                Ok(())
            }
            fn set_compressor(&mut self, _settings: &CompressorSettings) -> Result<()> {
                Ok(())
            }
            fn set_limiter(&mut self, _settings: &LimiterSettings, _engaged: bool) -> Result<()> {
                Ok(())
            }
            fn set_stereo_width(&mut self, _settings: &StereoWidthSettings) -> Result<()> {
                Ok(())
            }
            fn set_exciter(&mut self, _settings: &ExciterSettings) -> Result<()> {
                Ok(())
            }
            fn set_reverb(&mut self, _preset: u8, _enabled: bool) -> Result<()> {
                Ok(())
            }
        }

        let mut rack = EffectRack::new(Box::new(RejectingSink));
        rack.set_bass(900);
        // The stored state still updates even though the sink refused it.
        assert_eq!(rack.state().bass, 900);
    }
}
