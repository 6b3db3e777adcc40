pub mod script;
pub mod service;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analysis::{Band, FrequencyAnalysis, SpectralBandAnalyzer};
use crate::config::EngineConfig;
use crate::effects::{EffectRack, EffectSink, EffectState};
use crate::history::RingLog;
use crate::observe::Observable;
use crate::ratings::SongRatingIndex;
use crate::tactics::{ParamMutation, Tactic};

/// Entries kept in the session event log.
const EVENT_LOG_CAPACITY: usize = 50;
/// Entries kept in the rolling attack record.
const ATTACK_LOG_CAPACITY: usize = 20;
/// Attack records older than this are expired each cycle.
const ATTACK_EXPIRY_MS: u64 = 5_000;
/// Opponent level jump within one watcher tick that triggers the counter.
const COUNTER_ATTACK_JUMP: f32 = 10.0;

/// Session lifecycle. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BattleState {
    #[default]
    Idle,
    Active,
    Paused,
    Ended,
}

/// Strategic posture for the session. Aggressive postures auto-execute
/// counter actions the moment an opening appears; the others only surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Posture {
    Aggressive,
    #[default]
    Balanced,
    Defensive,
}

/// Transient detections that the opponent is momentarily vulnerable,
/// in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityKind {
    /// They went quiet right after playing loud — likely a track change.
    SilenceDetected,
    /// Loud overall but no low end to speak of.
    BassGap,
    /// Their high-mids are empty; vocals and leads can cut through.
    ClarityGap,
    /// Their level is swinging; they are mid-transition.
    Transition,
}

impl OpportunityKind {
    pub fn severity(self) -> Severity {
        match self {
            OpportunityKind::SilenceDetected => Severity::Critical,
            OpportunityKind::BassGap => Severity::Critical,
            OpportunityKind::ClarityGap => Severity::High,
            OpportunityKind::Transition => Severity::Medium,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OpportunityKind::SilenceDetected => "silence detected",
            OpportunityKind::BassGap => "bass gap",
            OpportunityKind::ClarityGap => "clarity gap",
            OpportunityKind::Transition => "transition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub severity: Severity,
    pub detected_at_ms: u64,
}

/// Everything that lands in the session event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleEvent {
    BattleStarted(Posture),
    BattlePaused,
    BattleResumed,
    BattleEnded,
    TacticExecuted(String),
    OpportunityDetected(OpportunityKind),
    /// Raised for critical opportunities; the presentation layer turns this
    /// into a haptic/alert signal.
    Alert(OpportunityKind),
    MomentumShift { rising: bool, momentum: u8 },
    /// The watcher saw the opponent surge and fired the full counter.
    CounterAttack,
    CaptureLost,
    CaptureRestored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at_ms: u64,
    pub event: BattleEvent,
}

/// A recently launched attack, kept for a few seconds so the presentation
/// layer can show what is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackRecord {
    pub at_ms: u64,
    pub label: String,
}

/// Mutable session model: lifecycle state, posture, momentum and the bounded
/// event log. Published as a whole after every change.
#[derive(Debug, Clone)]
pub struct BattleSession {
    pub state: BattleState,
    pub posture: Posture,
    /// Who is winning, 0–100 with 50 meaning even.
    pub momentum: u8,
    pub active_opportunity: Option<Opportunity>,
    log: RingLog<LogEntry>,
}

impl Default for BattleSession {
    fn default() -> Self {
        Self {
            state: BattleState::Idle,
            posture: Posture::default(),
            momentum: 50,
            active_opportunity: None,
            log: RingLog::new(EVENT_LOG_CAPACITY),
        }
    }
}

impl BattleSession {
    pub fn events(&self) -> Vec<LogEntry> {
        self.log.to_vec()
    }

    pub fn latest_event(&self) -> Option<&LogEntry> {
        self.log.latest()
    }
}

/// How the opponent is fighting, classified from band thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpponentStrategy {
    BassHeavy,
    ClarityFocused,
    VocalHeavy,
    Balanced,
}

pub fn classify_strategy(analysis: &FrequencyAnalysis) -> OpponentStrategy {
    if analysis.band(Band::SubBass) > 0.7 && analysis.band(Band::Bass) > 0.6 {
        OpponentStrategy::BassHeavy
    } else if analysis.band(Band::HighMid) > 0.6 && analysis.band(Band::High) > 0.5 {
        OpponentStrategy::ClarityFocused
    } else if analysis.band(Band::Mid) > 0.6 {
        OpponentStrategy::VocalHeavy
    } else {
        OpponentStrategy::Balanced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionReason {
    WinBackCrowd,
    RideTheWave,
    CounterBassWithClarity,
    CounterClarityWithBass,
    Strongest,
}

impl SuggestionReason {
    pub fn label(self) -> &'static str {
        match self {
            SuggestionReason::WinBackCrowd => "losing momentum: win the crowd back",
            SuggestionReason::RideTheWave => "winning: keep the energy up",
            SuggestionReason::CounterBassWithClarity => "counter their bass with clarity",
            SuggestionReason::CounterClarityWithBass => "counter their clarity with bass",
            SuggestionReason::Strongest => "play the strongest track",
        }
    }
}

/// Counter-song pick surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub track_id: String,
    pub reason: SuggestionReason,
    pub overall: u8,
}

/// Read-only, push-updated views over the engine for any presentation layer.
#[derive(Debug)]
pub struct EngineObservables {
    pub analysis: Observable<FrequencyAnalysis>,
    pub effects: Observable<EffectState>,
    pub session: Observable<BattleSession>,
    pub suggestion: Observable<Option<Suggestion>>,
    /// False while capture is failing; the engine keeps running on silence.
    pub capture_ok: Observable<bool>,
}

impl Default for EngineObservables {
    fn default() -> Self {
        Self {
            analysis: Observable::default(),
            effects: Observable::default(),
            session: Observable::default(),
            suggestion: Observable::default(),
            capture_ok: Observable::new(true),
        }
    }
}

/// Fixed auto-counter boost per opponent band, in millibels, applied to the
/// mapped local EQ slot when that band is weak.
const COUNTER_BOOST_MB: [i32; 6] = [1500, 1200, 800, 1000, 1200, 1000];

/// The periodic controller: consumes analysis snapshots and steers the
/// effect rack, session momentum, opportunity detection and song suggestions.
///
/// The engine itself is synchronous and single-threaded; all concurrency
/// lives in [`service::EngineService`], which owns one of these behind a
/// command queue.
pub struct BattleDecisionEngine {
    config: EngineConfig,
    rack: EffectRack,
    analyzer: SpectralBandAnalyzer,
    session: BattleSession,
    ratings: SongRatingIndex,
    observables: Arc<EngineObservables>,
    attacks: RingLog<AttackRecord>,
    suggestion: Option<Suggestion>,
    /// Opponent overall level from the previous main cycle.
    previous_level: f32,
    /// Opponent overall level at the previous watcher tick. `None` until the
    /// watcher has seen its first tick of the session.
    watcher_level: Option<f32>,
    capture_ok: bool,
    started: Instant,
}

impl BattleDecisionEngine {
    pub fn new(config: EngineConfig, sink: Box<dyn EffectSink>, ratings: SongRatingIndex) -> Self {
        let rack = EffectRack::new(sink);
        let observables = Arc::new(EngineObservables::default());
        observables.effects.publish(rack.state().clone());
        Self {
            config,
            rack,
            analyzer: SpectralBandAnalyzer::new(),
            session: BattleSession::default(),
            ratings,
            observables,
            attacks: RingLog::new(ATTACK_LOG_CAPACITY),
            suggestion: None,
            previous_level: 0.0,
            watcher_level: None,
            capture_ok: true,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn observables(&self) -> Arc<EngineObservables> {
        self.observables.clone()
    }

    pub fn session(&self) -> &BattleSession {
        &self.session
    }

    pub fn effects(&self) -> &EffectState {
        self.rack.state()
    }

    /// Direct access for user-triggered controls. Callers go through the
    /// same serialized owner as the cycle, so writes stay consistent.
    pub fn rack_mut(&mut self) -> &mut EffectRack {
        &mut self.rack
    }

    pub fn active_attacks(&self) -> Vec<AttackRecord> {
        self.attacks.to_vec()
    }

    pub fn set_auto_counter_eq(&mut self, enabled: bool) {
        self.config.auto_counter_eq = enabled;
    }

    pub fn set_auto_volume_match(&mut self, enabled: bool) {
        self.config.auto_volume_match = enabled;
    }

    pub fn set_song_suggestions(&mut self, enabled: bool) {
        self.config.song_suggestions = enabled;
    }

    // --- lifecycle ------------------------------------------------------

    /// Starts a session. A second call while one is active is a no-op.
    pub fn start_battle(&mut self, posture: Posture) {
        match self.session.state {
            BattleState::Active => {
                tracing::debug!("start_battle ignored: session already active");
            }
            BattleState::Ended => {
                tracing::debug!("start_battle ignored: session has ended");
            }
            BattleState::Idle | BattleState::Paused => {
                let now = self.now_ms();
                self.session.state = BattleState::Active;
                self.session.posture = posture;
                self.session.momentum = 50;
                self.session.active_opportunity = None;
                self.watcher_level = None;
                self.log_event(now, BattleEvent::BattleStarted(posture));
                tracing::info!(?posture, "battle started");
                self.publish_session();
            }
        }
    }

    pub fn pause_battle(&mut self) {
        if self.session.state != BattleState::Active {
            return;
        }
        let now = self.now_ms();
        self.session.state = BattleState::Paused;
        self.log_event(now, BattleEvent::BattlePaused);
        self.publish_session();
    }

    pub fn resume_battle(&mut self) {
        if self.session.state != BattleState::Paused {
            return;
        }
        let now = self.now_ms();
        self.session.state = BattleState::Active;
        self.log_event(now, BattleEvent::BattleResumed);
        self.publish_session();
    }

    /// Ends the session for good; further cycles and commands are ignored.
    pub fn end_battle(&mut self) {
        if self.session.state == BattleState::Ended {
            return;
        }
        let now = self.now_ms();
        self.session.state = BattleState::Ended;
        self.session.active_opportunity = None;
        self.log_event(now, BattleEvent::BattleEnded);
        tracing::info!("battle ended");
        self.publish_session();
    }

    /// Called by the service with the outcome of each capture read so the
    /// presentation layer can show an "engine degraded" status.
    pub fn set_capture_ok(&mut self, ok: bool) {
        if self.capture_ok == ok {
            return;
        }
        self.capture_ok = ok;
        let now = self.now_ms();
        let event = if ok {
            BattleEvent::CaptureRestored
        } else {
            BattleEvent::CaptureLost
        };
        self.log_event(now, event);
        self.observables.capture_ok.publish(ok);
        self.publish_session();
    }

    // --- the main cycle -------------------------------------------------

    /// One full cycle from a raw sample block. An empty block degrades to a
    /// silent analysis; it never fails.
    pub fn process_block(&mut self, block: &[f32]) {
        if self.session.state != BattleState::Active {
            return;
        }
        let analysis = self.analyzer.analyze(block);
        self.run_cycle(analysis);
    }

    /// Decision steps 2–7 against one analysis snapshot. Public so simulated
    /// battles and tests can drive the engine deterministically.
    pub fn run_cycle(&mut self, analysis: FrequencyAnalysis) {
        if self.session.state != BattleState::Active {
            return;
        }
        let now = analysis.timestamp_ms;
        self.observables.analysis.publish(analysis.clone());

        if self.config.auto_counter_eq {
            self.auto_counter_eq(&analysis);
        }
        if self.config.auto_volume_match {
            self.auto_volume_match(&analysis);
        }
        self.detect_opportunity(&analysis, now);
        self.update_momentum(&analysis, now);
        if self.config.song_suggestions {
            self.update_suggestion(&analysis);
        }
        self.attacks
            .retain(|attack| now.saturating_sub(attack.at_ms) <= ATTACK_EXPIRY_MS);

        self.previous_level = analysis.overall_level;
        self.publish_effects();
        self.publish_session();
    }

    /// Counter-attack watcher tick: fires the full counter when the opponent
    /// surges by more than 10 between two ticks. Runs on its own cadence,
    /// independent of the main cycle.
    pub fn watcher_tick(&mut self) {
        if self.session.state != BattleState::Active {
            return;
        }
        let level = self.observables.analysis.get().overall_level;
        let jumped = self
            .watcher_level
            .map(|previous| level - previous > COUNTER_ATTACK_JUMP)
            .unwrap_or(false);
        self.watcher_level = Some(level);
        if !jumped {
            return;
        }

        let now = self.now_ms();
        tracing::info!(level, "opponent surge: going nuclear");
        self.rack.go_nuclear();
        self.record_attack(now, "counter-attack: nuclear");
        self.log_event(now, BattleEvent::CounterAttack);
        self.publish_effects();
        self.publish_session();
    }

    /// Plans and applies a tactic against the latest analysis snapshot.
    /// Ignored unless a battle is running, so paused sessions stay frozen.
    pub fn apply_tactic(&mut self, tactic: Tactic) {
        if self.session.state != BattleState::Active {
            return;
        }
        let analysis = self.observables.analysis.get();
        let plan = tactic.plan(&analysis);
        let now = self.now_ms();
        for mutation in &plan.mutations {
            self.apply_mutation(*mutation);
        }
        tracing::debug!(tactic = tactic.name(), "{}", plan.log_entry);
        self.record_attack(now, plan.log_entry.clone());
        self.log_event(now, BattleEvent::TacticExecuted(plan.log_entry));
        self.publish_effects();
        self.publish_session();
    }

    /// Applies one flattened script step (or a direct user control routed
    /// through the same path). Ignored unless a battle is running.
    pub fn apply_script_op(&mut self, op: script::ScriptOp) {
        if self.session.state != BattleState::Active {
            return;
        }
        match op {
            script::ScriptOp::Bass(level) => self.rack.set_bass(level),
            script::ScriptOp::Loudness(level) => self.rack.set_loudness(level),
            script::ScriptOp::Clarity(level) => self.rack.set_clarity(level),
            script::ScriptOp::EqBand { slot, millibels } => self.rack.set_eq_band(slot, millibels),
            script::ScriptOp::EmergencyBassBoost => self.rack.emergency_bass_boost(),
            script::ScriptOp::Nuclear => self.rack.go_nuclear(),
        }
        self.publish_effects();
    }

    fn apply_mutation(&mut self, mutation: ParamMutation) {
        match mutation {
            ParamMutation::SetBass(level) => self.rack.set_bass(level),
            ParamMutation::SetLoudness(level) => self.rack.set_loudness(level),
            ParamMutation::SetEqBand { slot, millibels } => self.rack.set_eq_band(slot, millibels),
            ParamMutation::AdjustEqBand { slot, delta_mb } => {
                self.rack.adjust_eq_band(slot, delta_mb)
            }
        }
    }

    // --- cycle steps ----------------------------------------------------

    fn auto_counter_eq(&mut self, analysis: &FrequencyAnalysis) {
        for &band in &analysis.weak_bands {
            self.rack
                .adjust_eq_band(band.eq_slot(), COUNTER_BOOST_MB[band.index()]);
        }

        if analysis.strong_bands.is_empty() {
            return;
        }
        if self.session.posture == Posture::Aggressive {
            // Meet them head on: max out the slots they dominate.
            for &band in &analysis.strong_bands {
                let slot = band.eq_slot();
                let max = self.rack.eq_range(slot).max_mb;
                self.rack.set_eq_band(slot, max);
            }
        } else if classify_strategy(analysis) == OpponentStrategy::BassHeavy {
            // Slip above a bass-heavy opponent instead of fighting the lows.
            self.rack
                .adjust_eq_band(crate::effects::PRESENCE_SLOT, 1200);
            self.rack.adjust_eq_band(crate::effects::AIR_SLOT, 1000);
        }
    }

    fn auto_volume_match(&mut self, analysis: &FrequencyAnalysis) {
        let level = analysis.overall_level;
        let step_mb = if level < 70.0 {
            300
        } else if level < 85.0 {
            600
        } else if level < 95.0 {
            800
        } else {
            1000
        };
        self.rack.adjust_loudness(step_mb);
        if level > 90.0 {
            self.rack.set_bass(1000);
        }
    }

    fn detect_opportunity(&mut self, analysis: &FrequencyAnalysis, now: u64) {
        let detected = if analysis.overall_level < 60.0 && self.previous_level > 80.0 {
            Some(OpportunityKind::SilenceDetected)
        } else if analysis.band(Band::SubBass) < 0.2 && analysis.overall_level > 70.0 {
            Some(OpportunityKind::BassGap)
        } else if analysis.band(Band::HighMid) < 0.3 {
            Some(OpportunityKind::ClarityGap)
        } else if analysis.is_transitioning {
            Some(OpportunityKind::Transition)
        } else {
            None
        };

        let Some(kind) = detected else {
            self.session.active_opportunity = None;
            return;
        };

        let already_active = self
            .session
            .active_opportunity
            .map(|active| active.kind == kind)
            .unwrap_or(false);
        if already_active {
            return;
        }

        let opportunity = Opportunity {
            kind,
            severity: kind.severity(),
            detected_at_ms: now,
        };
        self.session.active_opportunity = Some(opportunity);
        self.log_event(now, BattleEvent::OpportunityDetected(kind));
        tracing::info!(kind = kind.label(), "attack opportunity");

        if opportunity.severity == Severity::Critical {
            self.log_event(now, BattleEvent::Alert(kind));
        }
        if self.session.posture == Posture::Aggressive {
            self.execute_opportunity_action(kind, now);
        }
    }

    /// The fixed action wired to each opportunity kind.
    fn execute_opportunity_action(&mut self, kind: OpportunityKind, now: u64) {
        match kind {
            OpportunityKind::SilenceDetected => self.rack.emergency_bass_boost(),
            OpportunityKind::BassGap => {
                let max0 = self.rack.eq_range(0).max_mb;
                let max1 = self.rack.eq_range(1).max_mb;
                self.rack.set_eq_band(0, max0);
                self.rack.set_eq_band(1, max1);
            }
            OpportunityKind::ClarityGap => self.rack.cut_through(),
            OpportunityKind::Transition => self.rack.go_nuclear(),
        }
        self.record_attack(now, format!("auto: {}", kind.label()));
    }

    fn update_momentum(&mut self, analysis: &FrequencyAnalysis, now: u64) {
        let diff = self.rack.state().estimated_output_level() - analysis.overall_level;
        let mut delta: i32 = if diff > 6.0 {
            2
        } else if diff > 3.0 {
            1
        } else if diff < -6.0 {
            -2
        } else if diff < -3.0 {
            -1
        } else {
            0
        };
        if analysis.weak_bands.len() >= 2 {
            delta += 1;
        }
        if analysis.strong_bands.len() >= 3 {
            delta -= 1;
        }
        if analysis.is_transitioning {
            delta += 2;
        }

        let before = self.session.momentum;
        let after = (before as i32 + delta).clamp(0, 100) as u8;
        self.session.momentum = after;

        if before <= 70 && after > 70 {
            self.log_event(
                now,
                BattleEvent::MomentumShift {
                    rising: true,
                    momentum: after,
                },
            );
        } else if before >= 30 && after < 30 {
            self.log_event(
                now,
                BattleEvent::MomentumShift {
                    rising: false,
                    momentum: after,
                },
            );
        }
    }

    fn update_suggestion(&mut self, analysis: &FrequencyAnalysis) {
        let momentum = self.session.momentum;
        let strategy = classify_strategy(analysis);

        let pick = if momentum < 30 {
            self.ratings
                .best_by(80, |r| r.crowd_appeal)
                .map(|(id, r)| (id, r, SuggestionReason::WinBackCrowd))
        } else if momentum > 70 {
            self.ratings
                .best_by(80, |r| r.energy)
                .map(|(id, r)| (id, r, SuggestionReason::RideTheWave))
        } else if strategy == OpponentStrategy::BassHeavy {
            self.ratings
                .best_by(70, |r| r.clarity)
                .map(|(id, r)| (id, r, SuggestionReason::CounterBassWithClarity))
        } else if strategy == OpponentStrategy::ClarityFocused {
            self.ratings
                .best_by(80, |r| r.bass_impact)
                .map(|(id, r)| (id, r, SuggestionReason::CounterClarityWithBass))
        } else {
            self.ratings
                .best_overall()
                .map(|(id, r)| (id, r, SuggestionReason::Strongest))
        };

        let suggestion = pick.map(|(track_id, rating, reason)| Suggestion {
            track_id: track_id.to_string(),
            reason,
            overall: rating.overall,
        });

        if suggestion != self.suggestion {
            self.suggestion = suggestion.clone();
            self.observables.suggestion.publish(suggestion);
        }
    }

    // --- helpers --------------------------------------------------------

    pub fn suggestion(&self) -> Option<&Suggestion> {
        self.suggestion.as_ref()
    }

    fn record_attack(&mut self, now: u64, label: impl Into<String>) {
        self.attacks.push(AttackRecord {
            at_ms: now,
            label: label.into(),
        });
    }

    fn log_event(&mut self, at_ms: u64, event: BattleEvent) {
        self.session.log.push(LogEntry { at_ms, event });
    }

    fn publish_effects(&self) {
        self.observables.effects.publish(self.rack.state().clone());
    }

    fn publish_session(&self) {
        self.observables.session.publish(self.session.clone());
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl std::fmt::Debug for BattleDecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleDecisionEngine")
            .field("session", &self.session)
            .field("capture_ok", &self.capture_ok)
            .field("attacks", &self.attacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::NullSink;
    use crate::ratings::SongRating;

    fn engine() -> BattleDecisionEngine {
        let mut config = EngineConfig::default();
        config.song_suggestions = false;
        BattleDecisionEngine::new(config, Box::new(NullSink), SongRatingIndex::new())
    }

    fn analysis_at(level: f32, bands: [f32; 6], ts: u64) -> FrequencyAnalysis {
        FrequencyAnalysis::from_levels(level, bands, false, ts)
    }

    #[test]
    fn start_battle_is_idempotent() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);
        assert_eq!(engine.session().state, BattleState::Active);
        let events_before = engine.session().events().len();

        engine.start_battle(Posture::Aggressive);
        assert_eq!(engine.session().state, BattleState::Active);
        // Still the original posture: the second call changed nothing.
        assert_eq!(engine.session().posture, Posture::Balanced);
        assert_eq!(engine.session().events().len(), events_before);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut engine = engine();
        assert_eq!(engine.session().state, BattleState::Idle);

        engine.start_battle(Posture::Balanced);
        engine.pause_battle();
        assert_eq!(engine.session().state, BattleState::Paused);

        engine.resume_battle();
        assert_eq!(engine.session().state, BattleState::Active);

        engine.end_battle();
        assert_eq!(engine.session().state, BattleState::Ended);

        // Ended is terminal.
        engine.start_battle(Posture::Balanced);
        assert_eq!(engine.session().state, BattleState::Ended);
    }

    #[test]
    fn cycles_after_end_change_nothing() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);
        engine.run_cycle(analysis_at(90.0, [0.5; 6], 100));
        engine.end_battle();

        let effects = engine.effects().clone();
        let momentum = engine.session().momentum;

        engine.run_cycle(analysis_at(120.0, [0.9; 6], 200));
        engine.process_block(&vec![0.9; 600]);
        engine.watcher_tick();

        assert_eq!(engine.effects(), &effects);
        assert_eq!(engine.session().momentum, momentum);
        assert_eq!(engine.session().state, BattleState::Ended);
    }

    #[test]
    fn auto_counter_boosts_weak_bands() {
        let mut engine = engine();
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Balanced);

        // Sub-bass and bass weak, everything else in the middle.
        let analysis = analysis_at(65.0, [0.1, 0.2, 0.5, 0.5, 0.5, 0.5], 100);
        let before = engine.effects().eq_bands;
        engine.run_cycle(analysis);

        assert_eq!(engine.effects().eq_bands[0], before[0] + 1500);
        assert_eq!(engine.effects().eq_bands[1], before[1] + 1200);
        assert_eq!(engine.effects().eq_bands[2], before[2]);
    }

    #[test]
    fn aggressive_posture_maxes_contested_slots() {
        let mut engine = engine();
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Aggressive);

        // Strong sub-bass and bass; nothing weak (all >= 0.3).
        let analysis = analysis_at(65.0, [0.9, 0.8, 0.5, 0.5, 0.5, 0.5], 100);
        engine.run_cycle(analysis);

        let max0 = engine.rack_mut().eq_range(0).max_mb;
        let max1 = engine.rack_mut().eq_range(1).max_mb;
        assert_eq!(engine.effects().eq_bands[0], max0);
        assert_eq!(engine.effects().eq_bands[1], max1);
    }

    #[test]
    fn balanced_posture_goes_over_the_top_of_bass() {
        let mut engine = engine();
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Balanced);

        let analysis = analysis_at(65.0, [0.9, 0.8, 0.5, 0.5, 0.5, 0.5], 100);
        let before = engine.effects().eq_bands;
        engine.run_cycle(analysis);

        // Bands 0/1 untouched by the strong-band rule; presence/air boosted.
        assert_eq!(engine.effects().eq_bands[0], before[0]);
        assert_eq!(engine.effects().eq_bands[1], before[1]);
        assert_eq!(engine.effects().eq_bands[3], before[3] + 1200);
        assert_eq!(engine.effects().eq_bands[4], before[4] + 1000);
    }

    #[test]
    fn auto_volume_steps_follow_the_level_table() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.start_battle(Posture::Balanced);

        engine.run_cycle(analysis_at(60.0, [0.5; 6], 100));
        assert_eq!(engine.effects().loudness, 300);

        engine.run_cycle(analysis_at(82.0, [0.5; 6], 200));
        assert_eq!(engine.effects().loudness, 300 + 600);

        engine.run_cycle(analysis_at(92.0, [0.5; 6], 300));
        // 900 + 800 saturates at the loudness ceiling.
        assert_eq!(engine.effects().loudness, 1000);
        // Level above 90 also forces bass to max.
        assert_eq!(engine.effects().bass, 1000);
    }

    #[test]
    fn silence_after_loud_raises_the_opportunity() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);

        engine.run_cycle(analysis_at(85.0, [0.5; 6], 100));
        assert!(engine.session().active_opportunity.is_none()
            || engine.session().active_opportunity.unwrap().kind
                != OpportunityKind::SilenceDetected);

        engine.run_cycle(analysis_at(55.0, [0.5; 6], 200));
        let opportunity = engine.session().active_opportunity.unwrap();
        assert_eq!(opportunity.kind, OpportunityKind::SilenceDetected);
        assert_eq!(opportunity.severity, Severity::Critical);
        assert!(engine
            .session()
            .events()
            .iter()
            .any(|entry| entry.event == BattleEvent::Alert(OpportunityKind::SilenceDetected)));
    }

    #[test]
    fn aggressive_silence_triggers_emergency_bass() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Aggressive);

        engine.run_cycle(analysis_at(85.0, [0.5; 6], 100));
        engine.run_cycle(analysis_at(55.0, [0.5; 6], 200));

        assert_eq!(engine.effects().bass, 1000);
        assert_eq!(engine.effects().loudness, 800);
        assert_eq!(engine.active_attacks().len(), 1);
    }

    #[test]
    fn bass_gap_outranks_clarity_gap() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);

        // Sub-bass empty and loud overall; high-mid also below 0.3.
        let analysis = analysis_at(80.0, [0.1, 0.5, 0.5, 0.5, 0.2, 0.5], 100);
        engine.run_cycle(analysis);

        assert_eq!(
            engine.session().active_opportunity.unwrap().kind,
            OpportunityKind::BassGap
        );
    }

    #[test]
    fn opportunity_clears_when_nothing_matches() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);

        engine.run_cycle(analysis_at(80.0, [0.1, 0.5, 0.5, 0.5, 0.2, 0.5], 100));
        assert!(engine.session().active_opportunity.is_some());

        engine.run_cycle(analysis_at(80.0, [0.5; 6], 200));
        assert!(engine.session().active_opportunity.is_none());
    }

    #[test]
    fn momentum_stays_clamped() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Balanced);

        // Opponent is overwhelmingly loud and broad: momentum bleeds away.
        for tick in 0..200 {
            engine.run_cycle(analysis_at(140.0, [0.9; 6], tick * 100));
        }
        assert_eq!(engine.session().momentum, 0);

        // Now they collapse: momentum recovers, still clamped to 100.
        for tick in 200..600 {
            let mut analysis = analysis_at(10.0, [0.1, 0.1, 0.5, 0.5, 0.5, 0.5], tick * 100);
            analysis.is_transitioning = tick == 200;
            engine.run_cycle(analysis);
        }
        assert_eq!(engine.session().momentum, 100);
    }

    #[test]
    fn momentum_shift_logged_on_crossing() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Balanced);

        // Quiet opponent with two weak bands: +2 SPL bucket +1 weak = +3/tick.
        for tick in 0..8 {
            engine.run_cycle(analysis_at(20.0, [0.1, 0.1, 0.5, 0.5, 0.5, 0.5], tick * 100));
        }

        assert!(engine.session().momentum > 70);
        assert!(engine.session().events().iter().any(|entry| matches!(
            entry.event,
            BattleEvent::MomentumShift { rising: true, .. }
        )));
    }

    #[test]
    fn watcher_fires_nuclear_on_surge() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Balanced);

        engine.run_cycle(analysis_at(70.0, [0.5; 6], 100));
        engine.watcher_tick(); // baseline 70

        engine.run_cycle(analysis_at(95.0, [0.5; 6], 300));
        engine.watcher_tick(); // jump of 25 > 10

        assert_eq!(engine.effects().bass, 1000);
        assert_eq!(engine.effects().loudness, 1000);
        assert!(engine
            .session()
            .events()
            .iter()
            .any(|entry| entry.event == BattleEvent::CounterAttack));
    }

    #[test]
    fn watcher_ignores_gradual_rise() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Balanced);

        for (tick, level) in [(1_u64, 70.0_f32), (2, 78.0), (3, 85.0)] {
            engine.run_cycle(analysis_at(level, [0.5; 6], tick * 200));
            engine.watcher_tick();
        }

        assert_ne!(engine.effects().loudness, 1000);
    }

    #[test]
    fn attack_records_expire_after_five_seconds() {
        let mut engine = engine();
        engine.set_auto_counter_eq(false);
        engine.set_auto_volume_match(false);
        engine.start_battle(Posture::Aggressive);

        engine.run_cycle(analysis_at(85.0, [0.5; 6], 100));
        engine.run_cycle(analysis_at(55.0, [0.5; 6], 200));
        assert_eq!(engine.active_attacks().len(), 1);

        engine.run_cycle(analysis_at(55.0, [0.5; 6], 6_000));
        assert!(engine.active_attacks().is_empty());
    }

    #[test]
    fn suggestions_follow_the_priority_ladder() {
        let mut ratings = SongRatingIndex::new();
        ratings.insert("crowd", SongRating::scored(60, 60, 70, 60, 99, 85));
        ratings.insert("energy", SongRating::scored(60, 60, 99, 60, 60, 85));
        ratings.insert("clarity", SongRating::scored(20, 99, 60, 60, 60, 75));
        ratings.insert("bass", SongRating::scored(99, 20, 60, 60, 60, 85));
        ratings.insert("best", SongRating::scored(70, 70, 70, 70, 70, 95));

        let mut config = EngineConfig::default();
        config.auto_counter_eq = false;
        config.auto_volume_match = false;
        config.song_suggestions = true;
        let mut engine = BattleDecisionEngine::new(config, Box::new(NullSink), ratings);
        engine.start_battle(Posture::Balanced);

        // Momentum even, opponent balanced: strongest track overall.
        engine.run_cycle(analysis_at(80.0, [0.5; 6], 100));
        assert_eq!(engine.suggestion().unwrap().track_id, "best");
        assert_eq!(engine.suggestion().unwrap().reason, SuggestionReason::Strongest);

        // Opponent turns bass-heavy: counter with clarity.
        engine.run_cycle(analysis_at(80.0, [0.8, 0.7, 0.5, 0.5, 0.5, 0.5], 200));
        assert_eq!(engine.suggestion().unwrap().track_id, "clarity");

        // Opponent goes clarity-focused: counter with bass.
        engine.run_cycle(analysis_at(80.0, [0.5, 0.5, 0.5, 0.5, 0.7, 0.6], 300));
        assert_eq!(engine.suggestion().unwrap().track_id, "bass");

        // Collapse momentum: crowd appeal wins regardless of their strategy.
        while engine.session().momentum >= 30 {
            engine.run_cycle(analysis_at(140.0, [0.9; 6], 400));
        }
        engine.run_cycle(analysis_at(140.0, [0.9; 6], 500));
        assert_eq!(engine.suggestion().unwrap().track_id, "crowd");
    }

    #[test]
    fn tactics_before_first_cycle_treat_silence_as_weak() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);

        // No cycle has run yet: the latest analysis is pre-cycle silence,
        // which classifies all six bands weak. Avoidance fills every slot
        // (+10 dB each; the shared top slot takes two boosts and clamps).
        engine.apply_tactic(Tactic::Avoidance);
        assert_eq!(engine.effects().eq_bands, [1000, 1000, 1000, 1000, 1500]);
    }

    #[test]
    fn paused_session_ignores_cycles() {
        let mut engine = engine();
        engine.start_battle(Posture::Balanced);
        engine.pause_battle();

        let before = engine.effects().clone();
        engine.run_cycle(analysis_at(95.0, [0.9; 6], 100));
        assert_eq!(engine.effects(), &before);
    }
}
