use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};

use crate::capture::CaptureSource;
use crate::config::EngineConfig;
use crate::effects::{BattleMode, EffectSink};
use crate::engine::script::{BattleScript, ScriptOp};
use crate::engine::{BattleDecisionEngine, BattleState, EngineObservables, Posture};
use crate::ratings::SongRatingIndex;
use crate::tactics::{Tactic, TacticCombo};
use crate::{DuelError, Result};

/// Commands accepted by the engine worker. Everything that touches engine
/// state goes through this queue, so the worker thread is the only writer.
#[derive(Debug)]
pub enum EngineCommand {
    Start(Posture),
    Pause,
    Resume,
    End,
    Tactic(Tactic),
    /// Run the combo on its own clock, one tactic per step.
    Combo(TacticCombo),
    /// Flatten the script and run it on its own clock.
    Script(BattleScript),
    /// One flattened script step, sent by a script runner (or a direct
    /// control from the presentation layer).
    ScriptOp(ScriptOp),
    BattleMode(BattleMode),
    DangerMode(bool),
    HardwareProtection(bool),
    /// Re-plan and apply the adaptive tactic on every adaptive tick.
    AdaptiveMode(bool),
    AutoCounterEq(bool),
    AutoVolumeMatch(bool),
    SongSuggestions(bool),
    SaveQuickProfile(usize),
    LoadQuickProfile(usize),
}

/// Owner of the engine worker thread.
///
/// The worker holds the [`BattleDecisionEngine`] and the capture source;
/// nothing else ever touches them. Callers interact through commands and read
/// state back through the shared [`EngineObservables`]. Dropping the service
/// ends the battle and joins the worker.
pub struct EngineService {
    commands: Sender<EngineCommand>,
    observables: Arc<EngineObservables>,
    worker: Option<JoinHandle<()>>,
}

impl EngineService {
    pub fn spawn(
        config: EngineConfig,
        sink: Box<dyn EffectSink>,
        ratings: SongRatingIndex,
        capture: Box<dyn CaptureSource>,
    ) -> Result<Self> {
        let engine = BattleDecisionEngine::new(config.clone(), sink, ratings);
        let observables = engine.observables();
        let (command_tx, command_rx) = unbounded();

        let runner_tx = command_tx.clone();
        let worker = std::thread::Builder::new()
            .name("duel-engine".to_string())
            .spawn(move || run_loop(engine, capture, config, command_rx, runner_tx))?;

        Ok(Self {
            commands: command_tx,
            observables,
            worker: Some(worker),
        })
    }

    pub fn observables(&self) -> Arc<EngineObservables> {
        self.observables.clone()
    }

    pub fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| DuelError::msg("engine worker has stopped"))
    }

    pub fn start_battle(&self, posture: Posture) -> Result<()> {
        self.send(EngineCommand::Start(posture))
    }

    pub fn pause_battle(&self) -> Result<()> {
        self.send(EngineCommand::Pause)
    }

    pub fn resume_battle(&self) -> Result<()> {
        self.send(EngineCommand::Resume)
    }

    pub fn apply_tactic(&self, tactic: Tactic) -> Result<()> {
        self.send(EngineCommand::Tactic(tactic))
    }

    pub fn run_script(&self, script: BattleScript) -> Result<()> {
        self.send(EngineCommand::Script(script))
    }

    pub fn run_combo(&self, combo: TacticCombo) -> Result<()> {
        self.send(EngineCommand::Combo(combo))
    }

    /// Ends the battle and shuts the worker down.
    pub fn end(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let _ = self.commands.send(EngineCommand::End);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| DuelError::msg("engine worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for EngineService {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for EngineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineService")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

/// The worker loop: commands, the main cycle, the counter-attack watcher and
/// the adaptive re-plan, all multiplexed on one thread.
fn run_loop(
    mut engine: BattleDecisionEngine,
    mut capture: Box<dyn CaptureSource>,
    config: EngineConfig,
    commands: Receiver<EngineCommand>,
    runner_tx: Sender<EngineCommand>,
) {
    let cycle = tick(Duration::from_millis(config.cycle_interval_ms.max(1)));
    let watcher = tick(Duration::from_millis(config.watcher_interval_ms.max(1)));
    let adaptive = tick(Duration::from_millis(config.adaptive_interval_ms.max(1)));
    let mut block = vec![0.0_f32; config.capture.block_size.max(1)];
    let mut adaptive_mode = false;

    tracing::debug!(
        cycle_ms = config.cycle_interval_ms,
        watcher_ms = config.watcher_interval_ms,
        "engine worker running"
    );

    loop {
        select! {
            recv(commands) -> command => {
                let Ok(command) = command else { break };
                let stop = handle_command(&mut engine, command, &mut adaptive_mode, &runner_tx);
                if stop {
                    break;
                }
            }
            recv(cycle) -> _ => {
                if engine.session().state != BattleState::Active {
                    continue;
                }
                match capture.read_block(&mut block) {
                    Ok(count) => {
                        engine.set_capture_ok(true);
                        engine.process_block(&block[..count]);
                    }
                    Err(err) => {
                        // Degrade to silence rather than stopping the cycle.
                        tracing::warn!(error = %err, "capture read failed");
                        engine.set_capture_ok(false);
                        engine.process_block(&[]);
                    }
                }
            }
            recv(watcher) -> _ => {
                engine.watcher_tick();
            }
            recv(adaptive) -> _ => {
                if adaptive_mode && engine.session().state == BattleState::Active {
                    engine.apply_tactic(Tactic::Adaptive);
                }
            }
        }
    }

    drop(capture);
    tracing::debug!("engine worker stopped");
}

/// Returns true when the worker should stop.
fn handle_command(
    engine: &mut BattleDecisionEngine,
    command: EngineCommand,
    adaptive_mode: &mut bool,
    runner_tx: &Sender<EngineCommand>,
) -> bool {
    match command {
        EngineCommand::Start(posture) => engine.start_battle(posture),
        EngineCommand::Pause => engine.pause_battle(),
        EngineCommand::Resume => engine.resume_battle(),
        EngineCommand::End => {
            engine.end_battle();
            return true;
        }
        EngineCommand::Tactic(tactic) => engine.apply_tactic(tactic),
        EngineCommand::Combo(combo) => spawn_combo_runner(combo, runner_tx.clone()),
        EngineCommand::Script(script) => spawn_script_runner(script, runner_tx.clone()),
        EngineCommand::ScriptOp(op) => engine.apply_script_op(op),
        EngineCommand::BattleMode(mode) => {
            engine.rack_mut().apply_battle_mode(mode);
            engine.observables().effects.publish(engine.effects().clone());
        }
        EngineCommand::DangerMode(enabled) => {
            engine.rack_mut().set_danger_mode(enabled);
            engine.observables().effects.publish(engine.effects().clone());
        }
        EngineCommand::HardwareProtection(enabled) => {
            engine.rack_mut().set_hardware_protection(enabled);
            engine.observables().effects.publish(engine.effects().clone());
        }
        EngineCommand::AdaptiveMode(enabled) => *adaptive_mode = enabled,
        EngineCommand::AutoCounterEq(enabled) => engine.set_auto_counter_eq(enabled),
        EngineCommand::AutoVolumeMatch(enabled) => engine.set_auto_volume_match(enabled),
        EngineCommand::SongSuggestions(enabled) => engine.set_song_suggestions(enabled),
        EngineCommand::SaveQuickProfile(slot) => engine.rack_mut().save_quick_profile(slot),
        EngineCommand::LoadQuickProfile(slot) => {
            engine.rack_mut().load_quick_profile(slot);
            engine.observables().effects.publish(engine.effects().clone());
        }
    }
    false
}

/// Plays a flattened script back on its own clock, feeding each step to the
/// worker as a command. The runner dies quietly once the worker is gone.
fn spawn_script_runner(script: BattleScript, tx: Sender<EngineCommand>) {
    let steps = script.expand();
    tracing::info!(script = %script.name, steps = steps.len(), "running battle script");

    let spawned = std::thread::Builder::new()
        .name("duel-script".to_string())
        .spawn(move || {
            for step in steps {
                if step.delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(step.delay_ms));
                }
                if tx.send(EngineCommand::ScriptOp(step.op)).is_err() {
                    return;
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "could not spawn script runner");
    }
}

fn spawn_combo_runner(combo: TacticCombo, tx: Sender<EngineCommand>) {
    tracing::info!(combo = %combo.name, steps = combo.tactics.len(), "running tactic combo");

    let spawned = std::thread::Builder::new()
        .name("duel-combo".to_string())
        .spawn(move || {
            for (index, tactic) in combo.tactics.iter().enumerate() {
                if index > 0 {
                    std::thread::sleep(Duration::from_millis(combo.step_delay_ms));
                }
                if tx.send(EngineCommand::Tactic(*tactic)).is_err() {
                    return;
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "could not spawn combo runner");
    }
}
