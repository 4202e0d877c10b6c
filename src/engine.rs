//! Turn controller.
//!
//! The engine owns the current immutable [`GameState`], the delta being built
//! for the turn in progress and the random stream. Commands are consumed one
//! at a time in arrival order; once every seat has ended its turn the engine
//! walks the phase machine, runs its calculators into the delta and commits a
//! brand-new state.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    ai::{policy_for, Policy, PolicyContext},
    commands::{Command, CommandOutcome, Rejection},
    config::Rules,
    delta::{apply_deltas, GameStateDelta},
    error::EngineError,
    rng::SeededRandom,
    systems::{
        evolution::{self, EvolutionResult},
        irrigation,
        placement::{self, ConflictPolicy},
        replant, AugmentationSystem, GrowthSystem, IrrigationSystem, PlacementSystem,
        ReplantSystem, SoilSystem,
    },
    turn::{EndTurnOutcome, TurnPhase, TurnQueue},
    world::{GameState, GameStateData, PlayerId},
};

const DEFAULT_EVENT_CAPACITY: usize = 256;

pub struct EngineSettings {
    pub scenario_name: String,
    pub rules: Rules,
    /// Events buffered per subscriber before slow readers start lagging.
    pub event_capacity: usize,
}

impl EngineSettings {
    pub fn new(scenario_name: impl Into<String>, rules: Rules) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            rules,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    /// The standard calculator pipeline. Growth must run before placement so
    /// that index-based removals precede appends on the same flower list.
    pub fn with_default_systems(self) -> Self {
        self.with_system(AugmentationSystem::new())
            .with_system(SoilSystem::new())
            .with_system(IrrigationSystem::new())
            .with_system(GrowthSystem::new())
            .with_system(PlacementSystem::new())
            .with_system(ReplantSystem::new())
    }

    pub fn build(self) -> Engine {
        let (events, _) = broadcast::channel(self.settings.event_capacity.max(1));
        Engine {
            systems: self.systems,
            settings: self.settings,
            state: None,
            previous: None,
            delta: GameStateDelta::new(),
            phase: TurnPhase::Init,
            rng: SeededRandom::new(0),
            queue: TurnQueue::default(),
            policies: BTreeMap::new(),
            pending: VecDeque::new(),
            events,
        }
    }
}

pub struct SystemContext<'a> {
    pub turn: u64,
    pub rules: &'a Rules,
}

/// A per-turn calculator. Systems read the current state and only ever write
/// into the turn's delta.
pub trait System {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        rng: &mut SeededRandom,
    ) -> Result<()>;
}

/// Notifications published to every subscriber.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PhaseChanged {
        turn: u64,
        from: TurnPhase,
        to: TurnPhase,
    },
    TurnCommitted {
        turn: u64,
        state: Arc<GameState>,
    },
    EvolutionResolved(EvolutionResult),
}

pub struct Engine {
    systems: Vec<Box<dyn System>>,
    settings: EngineSettings,
    state: Option<Arc<GameState>>,
    previous: Option<Arc<GameState>>,
    delta: GameStateDelta,
    phase: TurnPhase,
    rng: SeededRandom,
    queue: TurnQueue,
    policies: BTreeMap<PlayerId, Box<dyn Policy>>,
    pending: VecDeque<Command>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Install a baseline state. The random stream resumes from the state's
    /// carried position and the phase machine restarts at `Init`.
    pub fn load(&mut self, state: GameState) {
        self.rng = SeededRandom::from_state(&state.random_state());
        self.queue = TurnQueue::new(
            state
                .players()
                .filter(|player| player.controller.takes_turns())
                .map(|player| player.id),
        );
        self.policies = state
            .players()
            .filter_map(|player| policy_for(player.controller).map(|policy| (player.id, policy)))
            .collect();
        info!(
            scenario = %self.settings.scenario_name,
            turn = state.turn(),
            players = state.players().count(),
            "state loaded"
        );
        self.state = Some(Arc::new(state));
        self.previous = None;
        self.delta = GameStateDelta::new();
        self.phase = TurnPhase::Init;
        self.pending.clear();
    }

    pub fn load_data(&mut self, data: GameStateData) -> Result<(), EngineError> {
        let state = GameState::from_data(data)?;
        self.load(state);
        Ok(())
    }

    /// Leave `Init` and open the first action phase.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.baseline()?;
        self.transition(TurnPhase::Action)?;
        self.run_policies();
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> Option<Arc<GameState>> {
        self.state.clone()
    }

    /// State before the last commit, for read-only comparison.
    pub fn previous_state(&self) -> Option<Arc<GameState>> {
        self.previous.clone()
    }

    /// The delta accumulated for the turn in progress.
    pub fn delta(&self) -> &GameStateDelta {
        &self.delta
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn rules(&self) -> &Rules {
        &self.settings.rules
    }

    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    pub fn turn(&self) -> Option<u64> {
        self.state.as_ref().map(|state| state.turn())
    }

    pub fn awaiting(&self) -> Vec<PlayerId> {
        self.queue.awaiting().collect()
    }

    pub fn is_ready(&self) -> bool {
        self.queue.is_ready()
    }

    /// Queue a command for the next [`Engine::pump`].
    pub fn submit(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Execute queued commands strictly in arrival order. A fatal error stops
    /// the pump and leaves the remaining commands queued.
    pub fn pump(&mut self) -> Result<Vec<CommandOutcome>, EngineError> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(command) = self.pending.pop_front() {
            outcomes.push(self.execute(command)?);
        }
        Ok(outcomes)
    }

    /// Run one command now. Gameplay refusals come back as
    /// [`CommandOutcome::Rejected`]; `Err` is reserved for fatal failures.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutcome, EngineError> {
        let state = self.baseline()?;
        if self.phase != TurnPhase::Action {
            return Ok(rejected(&command, Rejection::WrongPhase(self.phase)));
        }
        let player = command.player();
        if state.player(player).is_none() {
            return Ok(rejected(&command, Rejection::UnknownPlayer));
        }
        if self.queue.has_ended(player) {
            return Ok(rejected(&command, Rejection::NotYourTurn));
        }

        let rules = &self.settings.rules;
        let outcome = match &command {
            Command::PlaceSeed {
                seed_type,
                tile,
                owner,
            } => placement::place_seed(
                &state,
                &mut self.delta,
                seed_type,
                *tile,
                *owner,
                ConflictPolicy::Reject,
            )
            .map(|remaining| CommandOutcome::SeedPlaced { remaining })
            .map_err(Rejection::from),
            Command::RemoveSeed {
                seed_type,
                tile,
                owner,
            } => placement::remove_seed(&state, &mut self.delta, seed_type, *tile, *owner)
                .map(|remaining| CommandOutcome::SeedRemoved { remaining })
                .map_err(Rejection::from),
            Command::PlaceCloud {
                player,
                cloud,
                tile,
            } => irrigation::place_cloud(&state, &mut self.delta, *player, *cloud, *tile)
                .map(|()| CommandOutcome::CloudPlaced),
            Command::SetAutoReplant {
                player,
                tile,
                seed_type,
            } => replant::set_slot(&state, &mut self.delta, *player, *tile, seed_type.as_ref())
                .map(|()| CommandOutcome::AutoReplantSet),
            Command::StageSeedForEvolution { player, seed_type } => {
                evolution::stage_seed(&state, &mut self.delta, rules, *player, seed_type)
                    .map(CommandOutcome::EvolutionStaged)
                    .map_err(Rejection::from)
            }
            Command::UnstageSeedForEvolution { player } => {
                evolution::unstage_seed(&mut self.delta, *player)
                    .map(|()| CommandOutcome::EvolutionUnstaged)
                    .map_err(Rejection::from)
            }
            Command::ResolveEvolution { player } => {
                evolution::resolve_evolution(&state, &mut self.delta, rules, &mut self.rng, *player)
                    .map(CommandOutcome::EvolutionResolved)
                    .map_err(Rejection::from)
            }
            Command::SelectEvolveChoice { player, index } => {
                evolution::select_choice(&state, &mut self.delta, *player, *index)
                    .map(|kind| CommandOutcome::EvolutionSelected { new_type: kind.id })
                    .map_err(Rejection::from)
            }
            Command::EndTurn { player } => return self.end_turn(*player),
        };

        Ok(match outcome {
            Ok(outcome) => {
                if let CommandOutcome::EvolutionResolved(result) = &outcome {
                    self.emit(EngineEvent::EvolutionResolved(result.clone()));
                }
                outcome
            }
            Err(rejection) => rejected(&command, rejection),
        })
    }

    fn end_turn(&mut self, player: PlayerId) -> Result<CommandOutcome, EngineError> {
        match self.queue.end_turn(player) {
            None => Ok(CommandOutcome::Rejected(Rejection::NotYourTurn)),
            Some(EndTurnOutcome::Accepted { awaiting }) => {
                debug!(player = %player, awaiting, "turn ended");
                Ok(CommandOutcome::TurnEnded { awaiting })
            }
            Some(EndTurnOutcome::ReadyToResolve) => {
                let turn = self.advance_turn()?;
                Ok(CommandOutcome::TurnAdvanced { turn })
            }
        }
    }

    /// Walk resolution, commit and reset, then open the next action phase.
    /// Every seat must have ended its turn. Returns the new turn number.
    ///
    /// A fatal error halts the walk where it failed, usually in
    /// `ApplyingDeltas`, with the current state untouched. The engine accepts
    /// no further commands until a state is installed again with [`Engine::load`].
    pub fn advance_turn(&mut self) -> Result<u64, EngineError> {
        self.baseline()?;
        if !self.queue.is_ready() {
            return Err(EngineError::AwaitingPlayers {
                awaiting: self.queue.awaiting().count(),
            });
        }
        self.transition(TurnPhase::ActionResolution)?;
        self.transition(TurnPhase::ApplyingDeltas)?;
        let turn = self.commit()?;
        self.transition(TurnPhase::ResettingActions)?;
        self.reset_actions();
        self.transition(TurnPhase::Action)?;
        self.run_policies();
        Ok(turn)
    }

    fn baseline(&self) -> Result<Arc<GameState>, EngineError> {
        self.state.clone().ok_or(EngineError::NoBaseline)
    }

    fn transition(&mut self, to: TurnPhase) -> Result<(), EngineError> {
        let from = self.phase;
        if !from.can_advance_to(to) {
            return Err(EngineError::IllegalTransition { from, to });
        }
        self.phase = to;
        let turn = self.turn().unwrap_or_default();
        info!(turn, ?from, ?to, "phase changed");
        self.emit(EngineEvent::PhaseChanged { turn, from, to });
        Ok(())
    }

    /// Run every calculator into the turn delta and commit it onto a clone of
    /// the current state. Nothing is replaced unless the whole delta applies.
    fn commit(&mut self) -> Result<u64, EngineError> {
        let current = self.baseline()?;
        let rules = &self.settings.rules;
        let ctx = SystemContext {
            turn: current.turn(),
            rules,
        };
        let mut rng = self.rng.clone();
        for system in &mut self.systems {
            system
                .run(&ctx, &current, &mut self.delta, &mut rng)
                .map_err(|source| EngineError::Calculator {
                    name: system.name().to_string(),
                    source: source.into(),
                })?;
        }

        let mut next = apply_deltas(GameState::clone(&current), &self.delta)?;
        next.settle(rules);
        next.turn = current.turn() + 1;
        next.random_state = rng.state();

        info!(
            turn = next.turn,
            entries = self.delta.len(),
            anomalies = self.delta.anomalies().len(),
            flowers = next.flowers().count(),
            "turn committed"
        );
        let turn = next.turn;
        let next = Arc::new(next);
        self.rng = rng;
        self.previous = Some(current);
        self.state = Some(Arc::clone(&next));
        self.delta = GameStateDelta::new();
        self.emit(EngineEvent::TurnCommitted { turn, state: next });
        Ok(turn)
    }

    /// Re-arm every seat and stage auto-replant seeds into the fresh delta.
    fn reset_actions(&mut self) {
        self.queue.reset();
        let Some(state) = self.state.clone() else {
            return;
        };
        for player in state.players() {
            for (tile, seed_type) in &player.auto_replant {
                if state.flower_at(*tile).is_some() {
                    continue;
                }
                if placement::available_seeds(&state, &self.delta, seed_type) < 1 {
                    replant::clear_slot(&mut self.delta, player.id, *tile);
                    continue;
                }
                match placement::place_seed(
                    &state,
                    &mut self.delta,
                    seed_type,
                    *tile,
                    player.id,
                    ConflictPolicy::Contest,
                ) {
                    Ok(remaining) if remaining <= 0 => {
                        replant::clear_slot(&mut self.delta, player.id, *tile);
                    }
                    Ok(_) => {}
                    Err(rejection) => {
                        debug!(player = %player.id, tile, ?rejection, "auto-replant skipped")
                    }
                }
            }
        }
    }

    /// Let every computer seat act, then end its turn.
    fn run_policies(&mut self) {
        let Some(state) = self.state.clone() else {
            return;
        };
        let mut resolved = Vec::new();
        for (player, policy) in self.policies.iter_mut() {
            let mut ctx = PolicyContext {
                state: &state,
                delta: &mut self.delta,
                rules: &self.settings.rules,
                rng: &mut self.rng,
                player: *player,
            };
            let report = policy.act(&mut ctx);
            debug!(player = %player, policy = policy.name(), placed = report.seeds_placed, "policy acted");
            resolved.extend(report.evolution);
            self.queue.end_turn(*player);
        }
        for result in resolved {
            self.emit(EngineEvent::EvolutionResolved(result));
        }
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

fn rejected(command: &Command, rejection: Rejection) -> CommandOutcome {
    debug!(?command, ?rejection, "command rejected");
    CommandOutcome::Rejected(rejection)
}
