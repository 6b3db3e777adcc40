use serde::{Deserialize, Serialize};

use crate::analysis::{Band, FrequencyAnalysis};
use crate::effects::{AIR_SLOT, EQ_SLOT_COUNT, PRESENCE_SLOT};

/// One requested change to the local effect chain. EQ values are millibels;
/// `Set*` variants are absolute targets, `Adjust*` variants are deltas
/// applied on top of the current (clamped) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamMutation {
    SetBass(i32),
    SetLoudness(i32),
    SetEqBand { slot: usize, millibels: i32 },
    AdjustEqBand { slot: usize, delta_mb: i32 },
}

/// Output of planning one tactic against one analysis snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TacticPlan {
    pub mutations: Vec<ParamMutation>,
    pub log_entry: String,
}

/// The named counter-strategies. Each is a pure function of the opponent's
/// latest [`FrequencyAnalysis`]; applying the resulting mutations is the
/// engine's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tactic {
    /// Boost the band that perceptually masks each of the opponent's strong
    /// bands.
    Masking,
    /// Duck where the opponent is strong, push where they are weak.
    Avoidance,
    /// Attack the opposite end of the spectrum from their battle zone.
    Flanking,
    /// Wall of sound: push every band plus bass and loudness.
    Saturation,
    /// Everything off except one band at a chosen gain.
    SurgicalStrike { band: Band, boost_db: i32 },
    /// Match their strong bands at full gain and max loudness.
    FrequencyLock,
    /// Re-evaluates the opponent periodically and delegates to one of the
    /// other tactics; see [`choose_adaptive`] for the priority order.
    Adaptive,
}

impl Tactic {
    pub fn name(&self) -> &'static str {
        match self {
            Tactic::Masking => "masking",
            Tactic::Avoidance => "avoidance",
            Tactic::Flanking => "flanking",
            Tactic::Saturation => "saturation",
            Tactic::SurgicalStrike { .. } => "surgical strike",
            Tactic::FrequencyLock => "frequency lock",
            Tactic::Adaptive => "adaptive",
        }
    }

    /// Plans the mutations this tactic wants against the given snapshot.
    pub fn plan(&self, analysis: &FrequencyAnalysis) -> TacticPlan {
        match *self {
            Tactic::Masking => plan_masking(analysis),
            Tactic::Avoidance => plan_avoidance(analysis),
            Tactic::Flanking => plan_flanking(analysis),
            Tactic::Saturation => plan_saturation(),
            Tactic::SurgicalStrike { band, boost_db } => plan_surgical(band, boost_db),
            Tactic::FrequencyLock => plan_frequency_lock(analysis),
            Tactic::Adaptive => choose_adaptive(analysis).plan(analysis),
        }
    }
}

/// Priority rules for the adaptive tactic, first match wins:
/// saturation against a broad assault, avoidance when there are holes to
/// slip through, flanking against a single-band push, frequency lock
/// otherwise.
pub fn choose_adaptive(analysis: &FrequencyAnalysis) -> Tactic {
    if analysis.strong_bands.len() >= 4 {
        Tactic::Saturation
    } else if analysis.weak_bands.len() >= 2 {
        Tactic::Avoidance
    } else if analysis.strong_bands.len() == 1 {
        Tactic::Flanking
    } else {
        Tactic::FrequencyLock
    }
}

/// An ordered tactic sequence executed with a fixed pause between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticCombo {
    pub name: String,
    pub tactics: Vec<Tactic>,
    pub step_delay_ms: u64,
}

impl TacticCombo {
    pub fn new(name: impl Into<String>, tactics: Vec<Tactic>, step_delay_ms: u64) -> Self {
        Self {
            name: name.into(),
            tactics,
            step_delay_ms,
        }
    }

    /// Stock two-punch opener: bury their lows, then cut through on top.
    pub fn shock_and_awe() -> Self {
        Self::new(
            "shock and awe",
            vec![Tactic::Saturation, Tactic::Masking, Tactic::Flanking],
            750,
        )
    }
}

fn plan_masking(analysis: &FrequencyAnalysis) -> TacticPlan {
    let mut mutations = Vec::new();
    let mut masked = Vec::new();
    for band in &analysis.strong_bands {
        let masker = band.masking_band();
        mutations.push(ParamMutation::AdjustEqBand {
            slot: masker.eq_slot(),
            delta_mb: 1200,
        });
        masked.push(band.label());
    }

    TacticPlan {
        mutations,
        log_entry: format!("masking: covering {}", join_or_none(&masked)),
    }
}

fn plan_avoidance(analysis: &FrequencyAnalysis) -> TacticPlan {
    let mut mutations = Vec::new();
    for band in &analysis.strong_bands {
        mutations.push(ParamMutation::AdjustEqBand {
            slot: band.eq_slot(),
            delta_mb: -600,
        });
    }
    for band in &analysis.weak_bands {
        mutations.push(ParamMutation::AdjustEqBand {
            slot: band.eq_slot(),
            delta_mb: 1000,
        });
    }

    TacticPlan {
        mutations,
        log_entry: format!(
            "avoidance: ducking {} strong, filling {} weak",
            analysis.strong_bands.len(),
            analysis.weak_bands.len()
        ),
    }
}

fn plan_flanking(analysis: &FrequencyAnalysis) -> TacticPlan {
    let Some(zone) = analysis.battle_zone() else {
        return TacticPlan {
            mutations: Vec::new(),
            log_entry: "flanking: no battle zone to flank".to_string(),
        };
    };

    let mutations = match zone {
        // They own the low end: go over the top.
        Band::SubBass | Band::Bass | Band::LowMid => vec![
            ParamMutation::AdjustEqBand {
                slot: PRESENCE_SLOT,
                delta_mb: 1200,
            },
            ParamMutation::AdjustEqBand {
                slot: AIR_SLOT,
                delta_mb: 1000,
            },
        ],
        // They own the top: go underneath.
        Band::Mid | Band::HighMid | Band::High => vec![
            ParamMutation::AdjustEqBand {
                slot: 0,
                delta_mb: 1500,
            },
            ParamMutation::AdjustEqBand {
                slot: 1,
                delta_mb: 1200,
            },
        ],
    };

    TacticPlan {
        mutations,
        log_entry: format!("flanking: opponent zone is {}", zone.label()),
    }
}

fn plan_saturation() -> TacticPlan {
    const CURVE_MB: [i32; EQ_SLOT_COUNT] = [1200, 1000, 800, 1000, 900];
    let mut mutations: Vec<ParamMutation> = CURVE_MB
        .iter()
        .enumerate()
        .map(|(slot, delta_mb)| ParamMutation::AdjustEqBand {
            slot,
            delta_mb: *delta_mb,
        })
        .collect();
    mutations.push(ParamMutation::SetBass(1000));
    mutations.push(ParamMutation::SetLoudness(900));

    TacticPlan {
        mutations,
        log_entry: "saturation: full-spectrum push".to_string(),
    }
}

fn plan_surgical(band: Band, boost_db: i32) -> TacticPlan {
    let target = band.eq_slot();
    let mut mutations = Vec::with_capacity(EQ_SLOT_COUNT);
    for slot in 0..EQ_SLOT_COUNT {
        let millibels = if slot == target { boost_db * 100 } else { 0 };
        mutations.push(ParamMutation::SetEqBand { slot, millibels });
    }

    TacticPlan {
        mutations,
        log_entry: format!(
            "surgical strike: {} at {boost_db} dB, all else flat",
            band.label()
        ),
    }
}

fn plan_frequency_lock(analysis: &FrequencyAnalysis) -> TacticPlan {
    let mut mutations: Vec<ParamMutation> = analysis
        .strong_bands
        .iter()
        .map(|band| ParamMutation::SetEqBand {
            slot: band.eq_slot(),
            millibels: 1500,
        })
        .collect();
    mutations.push(ParamMutation::SetLoudness(1000));

    TacticPlan {
        mutations,
        log_entry: format!(
            "frequency lock: matching {} strong band(s)",
            analysis.strong_bands.len()
        ),
    }
}

fn join_or_none(labels: &[&str]) -> String {
    if labels.is_empty() {
        "nothing".to_string()
    } else {
        labels.join(", ")
    }
}
