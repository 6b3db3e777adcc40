use serde::{Deserialize, Serialize};

/// One authored step in a battle script. Macro actions expand into several
/// primitive operations when the script is flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptAction {
    /// Pause before the next action.
    Wait(u64),
    SetBass(i32),
    SetLoudness(i32),
    SetClarity(i32),
    SetEqBand { slot: usize, millibels: i32 },
    /// Kill the bass, hold for half a second, then slam it back in.
    BassDropSequence,
    /// Ramp loudness from zero to full over one second.
    BuildUp,
    /// Everything to maximum at once.
    Nuclear,
}

/// Primitive operation a flattened script step performs on the effect rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptOp {
    Bass(i32),
    Loudness(i32),
    Clarity(i32),
    EqBand { slot: usize, millibels: i32 },
    EmergencyBassBoost,
    Nuclear,
}

/// A primitive operation with the pause that precedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStep {
    pub delay_ms: u64,
    pub op: ScriptOp,
}

/// Milliseconds the bass stays cut during [`ScriptAction::BassDropSequence`].
const BASS_DROP_HOLD_MS: u64 = 500;
/// Steps in the [`ScriptAction::BuildUp`] loudness ramp, including both ends.
const BUILD_UP_STEPS: i32 = 11;
/// Pause between build-up ramp steps.
const BUILD_UP_STEP_MS: u64 = 100;

/// Named, ordered sequence of scripted actions. Scripts are authored data;
/// the engine service flattens and executes them on its own clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleScript {
    pub name: String,
    pub actions: Vec<ScriptAction>,
}

impl BattleScript {
    pub fn new(name: impl Into<String>, actions: Vec<ScriptAction>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }

    /// Stock crowd-pleaser: build tension, drop the bass, then max out.
    pub fn drop_bomb() -> Self {
        Self::new(
            "drop bomb",
            vec![
                ScriptAction::BuildUp,
                ScriptAction::Wait(400),
                ScriptAction::BassDropSequence,
                ScriptAction::Wait(1_000),
                ScriptAction::Nuclear,
            ],
        )
    }

    /// Flattens the script into primitive steps. Consecutive waits fold into
    /// the delay of the step that follows them; trailing waits are dropped.
    pub fn expand(&self) -> Vec<ScriptStep> {
        let mut steps = Vec::new();
        let mut delay_ms = 0_u64;

        for action in &self.actions {
            match *action {
                ScriptAction::Wait(ms) => delay_ms += ms,
                ScriptAction::SetBass(level) => {
                    steps.push(ScriptStep {
                        delay_ms: std::mem::take(&mut delay_ms),
                        op: ScriptOp::Bass(level),
                    });
                }
                ScriptAction::SetLoudness(level) => {
                    steps.push(ScriptStep {
                        delay_ms: std::mem::take(&mut delay_ms),
                        op: ScriptOp::Loudness(level),
                    });
                }
                ScriptAction::SetClarity(level) => {
                    steps.push(ScriptStep {
                        delay_ms: std::mem::take(&mut delay_ms),
                        op: ScriptOp::Clarity(level),
                    });
                }
                ScriptAction::SetEqBand { slot, millibels } => {
                    steps.push(ScriptStep {
                        delay_ms: std::mem::take(&mut delay_ms),
                        op: ScriptOp::EqBand { slot, millibels },
                    });
                }
                ScriptAction::BassDropSequence => {
                    steps.push(ScriptStep {
                        delay_ms: std::mem::take(&mut delay_ms),
                        op: ScriptOp::Bass(0),
                    });
                    steps.push(ScriptStep {
                        delay_ms: BASS_DROP_HOLD_MS,
                        op: ScriptOp::EmergencyBassBoost,
                    });
                }
                ScriptAction::BuildUp => {
                    for step in 0..BUILD_UP_STEPS {
                        let level = step * 100;
                        steps.push(ScriptStep {
                            delay_ms: if step == 0 {
                                std::mem::take(&mut delay_ms)
                            } else {
                                BUILD_UP_STEP_MS
                            },
                            op: ScriptOp::Bass(level),
                        });
                        steps.push(ScriptStep {
                            delay_ms: 0,
                            op: ScriptOp::Loudness(level),
                        });
                    }
                }
                ScriptAction::Nuclear => {
                    steps.push(ScriptStep {
                        delay_ms: std::mem::take(&mut delay_ms),
                        op: ScriptOp::Nuclear,
                    });
                }
            }
        }

        steps
    }

    /// Total run time of the flattened script, waits included.
    pub fn duration_ms(&self) -> u64 {
        self.expand().iter().map(|step| step.delay_ms).sum()
    }
}
