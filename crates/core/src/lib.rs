//! Core library for the Sound Duel battle engine.
//!
//! The crate is organised around one periodic pipeline: capture a block of
//! the opponent's audio, reduce it to a coarse band/loudness analysis, run
//! the strategic rules over it, and mutate the local effect chain through a
//! pluggable sink. Each module owns a distinct subsystem (capture, analysis,
//! effects, tactics, ratings, the decision engine) and the [`engine::service`]
//! module wraps it all in a single worker thread with push-updated views.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod history;
pub mod observe;
pub mod ratings;
pub mod tactics;

pub use analysis::{Band, FrequencyAnalysis, SpectralBandAnalyzer};
pub use capture::{CaptureSource, CpalSource, NullSource, ScriptedSource};
pub use config::{CaptureConfig, EngineConfig};
pub use effects::{
    BattleMode, CompressorSettings, EffectRack, EffectSink, EffectState, LimiterSettings, NullSink,
    Preset,
};
pub use engine::script::{BattleScript, ScriptAction};
pub use engine::service::{EngineCommand, EngineService};
pub use engine::{
    BattleDecisionEngine, BattleEvent, BattleSession, BattleState, EngineObservables, Opportunity,
    OpportunityKind, Posture, Suggestion,
};
pub use error::{DuelError, Result};
pub use history::RingLog;
pub use observe::Observable;
pub use ratings::{Scenario, SongRating, SongRatingIndex, Tier};
pub use tactics::{ParamMutation, Tactic, TacticCombo, TacticPlan};
