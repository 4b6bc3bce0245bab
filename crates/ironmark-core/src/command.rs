use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use ironmark_protocol::{
    wire, Command, EntityId, EntityKind, EntityRef, Event, FactionEventKind, FactionId,
    GameResult, HistoryFile, Instruction, VariableId, VariableTarget, VictoryReason,
    HISTORY_FILE_VERSION,
};

use crate::entity::Entity;
use crate::error::{EngineError, HistoryImportError, InvalidCommand, InvariantViolation};
use crate::finder::Finder;
use crate::instruction::execute_instruction;
use crate::scenario::CompiledScenario;
use crate::script::{DefaultScript, PlayerSettings, RuleScript};
use crate::world::WorldState;

/// Lifecycle of one command through the pipeline. Phase misuse (running a
/// phase out of order) is a programmer error, not a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandPhase {
    Constructed,
    Validated,
    Expanded,
    Executed,
    Recorded,
}

/// Drives one command: Constructed → Validated → Expanded → Executed →
/// Recorded. Validation never mutates; expansion produces the instruction
/// program; execution applies it and captures created entities as weak
/// references.
pub struct CommandRun {
    pub faction: FactionId,
    pub command: Command,
    phase: CommandPhase,
    pub program: Vec<Instruction>,
    pub created: Vec<EntityRef>,
}

impl CommandRun {
    pub fn new(faction: FactionId, command: Command) -> Self {
        Self {
            faction,
            command,
            phase: CommandPhase::Constructed,
            program: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn phase(&self) -> CommandPhase {
        self.phase
    }

    fn step(&mut self, from: CommandPhase, to: CommandPhase) -> Result<(), InvariantViolation> {
        if self.phase != from {
            return Err(InvariantViolation::new(format!(
                "command phase is {:?}, expected {:?} before {:?}",
                self.phase, from, to
            )));
        }
        self.phase = to;
        Ok(())
    }

    /// Checks every invariant the command depends on against the current
    /// world, failing fast with the violated rule. Never mutates state.
    pub fn validate(&mut self, world: &WorldState) -> Result<(), EngineError> {
        self.step(CommandPhase::Constructed, CommandPhase::Validated)?;
        let faction = self.faction;
        match &self.command {
            Command::BeginTurn | Command::EndTurn => {
                require_active(world, faction)?;
            }
            Command::Build { orders } => validate_build(world, faction, orders)?,
            Command::Deploy { entity, at } => {
                require_active(world, faction)?;
                let e = owned_entity(world, *entity, faction)?;
                if e.site.is_some() {
                    return Err(InvalidCommand::Rule(format!(
                        "{} is already placed",
                        e.name
                    ))
                    .into());
                }
                let site = world
                    .site(*at)
                    .ok_or(InvalidCommand::UnknownSite(*at))?;
                if site.owner != Some(faction) {
                    return Err(InvalidCommand::IllegalSite {
                        name: e.name.clone(),
                        at: *at,
                        reason: "entities deploy onto owned sites only".into(),
                    }
                    .into());
                }
                world.script().validate_site(world, e, Some(*at))?;
            }
            Command::Move { unit, path } => {
                require_active(world, faction)?;
                let u = unit_of(world, *unit, faction)?;
                movement_cost(world, u, path)?;
            }
            Command::Attack { attacker, target } => {
                require_active(world, faction)?;
                validate_attack(world, faction, *attacker, *target)?;
            }
            Command::Rename { entity, name } => {
                require_active(world, faction)?;
                owned_entity(world, *entity, faction)?;
                if name.trim().is_empty() {
                    return Err(InvalidCommand::Rule("entity names cannot be empty".into()).into());
                }
            }
            Command::Transform { entity, class } => {
                require_active(world, faction)?;
                let e = owned_entity(world, *entity, faction)?;
                let scenario = world.scenario();
                let Some(target_class) = scenario.entity_classes.get(class.raw as usize) else {
                    return Err(
                        InvalidCommand::Rule(format!("unknown class {}", class.raw)).into()
                    );
                };
                if e.class == *class {
                    return Err(InvalidCommand::ClassUnchanged {
                        name: e.name.clone(),
                        class: target_class.name.clone(),
                    }
                    .into());
                }
                if target_class.kind != e.kind {
                    return Err(InvalidCommand::KindMismatch {
                        name: e.name.clone(),
                        from: format!("{:?}", e.kind),
                        to: format!("{:?}", target_class.kind),
                    }
                    .into());
                }
                // A placed terrain may not switch between background and
                // overlay: its stack position would no longer hold.
                if e.kind == EntityKind::Terrain && e.site.is_some() {
                    let current = scenario.entity_class(e.class);
                    if current.background != target_class.background {
                        return Err(InvalidCommand::Rule(format!(
                            "{} cannot change between background and overlay terrain in place",
                            e.name
                        ))
                        .into());
                    }
                }
            }
            Command::Resign => {
                let f = world
                    .faction(faction)
                    .ok_or(InvalidCommand::UnknownFaction(faction))?;
                if f.resigned {
                    return Err(InvalidCommand::Rule(format!(
                        "{} has already resigned",
                        f.name
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Invokes domain logic to produce the instruction program. Only reached
    /// after validation; still never mutates the world.
    pub fn expand(&mut self, world: &WorldState) -> Result<(), EngineError> {
        self.step(CommandPhase::Validated, CommandPhase::Expanded)?;
        let faction = self.faction;
        let scenario = world.scenario();
        let vars = scenario.vars;

        let program = match &self.command {
            Command::BeginTurn => {
                let f = world
                    .faction(faction)
                    .ok_or(InvalidCommand::UnknownFaction(faction))?;
                let mut program = Vec::new();
                for unit in &f.units {
                    let Some(u) = world.entity(*unit) else { continue };
                    program.push(Instruction::SetValue {
                        target: VariableTarget::Entity { entity: *unit },
                        variable: vars.moves_left,
                        value: u.attribute(vars.movement),
                        initial: false,
                    });
                }
                program.push(Instruction::SetValue {
                    target: VariableTarget::Faction { faction },
                    variable: vars.builds,
                    value: scenario.faction_class(f.class).builds_per_turn,
                    initial: false,
                });
                program
            }
            Command::EndTurn => vec![Instruction::AdvanceFaction],
            Command::Build { orders } => {
                let mut cost_totals: BTreeMap<VariableId, i64> = BTreeMap::new();
                let mut creations = Vec::new();
                let mut total_count = 0_i64;
                for order in orders {
                    let class = scenario.entity_class(order.class);
                    total_count += order.count as i64;
                    for (resource, amount) in &class.cost {
                        *cost_totals.entry(*resource).or_default() +=
                            amount * order.count as i64;
                    }
                    for _ in 0..order.count {
                        creations.push(Instruction::CreateEntity {
                            class: order.class,
                            owner: faction,
                            name: None,
                        });
                    }
                }

                let mut program = Vec::new();
                for (resource, total) in cost_totals {
                    program.push(Instruction::AdjustValue {
                        target: VariableTarget::Faction { faction },
                        variable: resource,
                        delta: -total,
                    });
                }
                program.push(Instruction::AdjustValue {
                    target: VariableTarget::Faction { faction },
                    variable: vars.builds,
                    delta: -total_count,
                });
                program.extend(creations);
                program
            }
            Command::Deploy { entity, at } => vec![Instruction::PlaceEntity {
                entity: *entity,
                at: *at,
            }],
            Command::Move { unit, path } => {
                let u = unit_of(world, *unit, faction)?;
                let cost = movement_cost(world, u, path)?;
                let mut program: Vec<Instruction> = path
                    .iter()
                    .map(|step| Instruction::PlaceEntity {
                        entity: *unit,
                        at: *step,
                    })
                    .collect();
                program.push(Instruction::AdjustValue {
                    target: VariableTarget::Entity { entity: *unit },
                    variable: vars.moves_left,
                    delta: -cost,
                });
                program
            }
            Command::Attack { attacker, target } => {
                let a = world
                    .entity(*attacker)
                    .ok_or(InvalidCommand::UnknownEntity(*attacker))?;
                let t = world
                    .entity(*target)
                    .ok_or(InvalidCommand::UnknownEntity(*target))?;
                let damage = (a.attribute(vars.attack) - t.attribute(vars.defense) / 2).max(1);

                let mut program = vec![Instruction::Message {
                    text: format!("{} attacks {}", a.name, t.name),
                    at: t.site,
                }];
                if let Some(ammunition) = scenario.entity_class(a.class).ammunition {
                    program.push(Instruction::AdjustValue {
                        target: VariableTarget::Entity { entity: *attacker },
                        variable: ammunition,
                        delta: -1,
                    });
                }
                program.push(Instruction::AdjustValue {
                    target: VariableTarget::Entity { entity: *target },
                    variable: vars.hits,
                    delta: -damage,
                });
                program
            }
            Command::Rename { entity, name } => vec![Instruction::SetEntityName {
                entity: *entity,
                name: name.clone(),
            }],
            Command::Transform { entity, class } => vec![Instruction::SetEntityClass {
                entity: *entity,
                class: *class,
            }],
            Command::Resign => {
                let f = world
                    .faction(faction)
                    .ok_or(InvalidCommand::UnknownFaction(faction))?;
                vec![
                    Instruction::ResignFaction { faction },
                    Instruction::Message {
                        text: format!("{} resigns", f.name),
                        at: None,
                    },
                ]
            }
        };

        self.program = program;
        Ok(())
    }

    /// Runs the program. Instructions re-validate their own preconditions;
    /// execution is checked but rollback-free.
    pub fn execute(&mut self, world: &mut WorldState) -> Result<Vec<Event>, EngineError> {
        self.step(CommandPhase::Expanded, CommandPhase::Executed)?;
        let mut events = Vec::new();

        if matches!(self.command, Command::BeginTurn) {
            events.push(Event::TurnStarted {
                turn: world.turn,
                faction: self.faction,
            });
            // Each opened turn leaves an Advanced mark with the faction's
            // current size and strength in its trail.
            if let Some(f) = world.faction(self.faction) {
                let name = f.name.clone();
                let size = f.size();
                let strength = world.faction_strength(self.faction);
                let turn = world.turn;
                world.history.record_faction(
                    self.faction,
                    &name,
                    turn,
                    FactionEventKind::Advanced,
                    size,
                    strength,
                )?;
            }
        }

        for instruction in &self.program {
            let outcome = execute_instruction(world, instruction)?;
            for id in outcome.created {
                if let Some(reference) = world.entity_ref(id) {
                    self.created.push(reference);
                }
            }
            events.extend(outcome.events);
        }
        debug!(
            faction = self.faction.0,
            instructions = self.program.len(),
            "command executed"
        );
        Ok(events)
    }

    /// Appends the command to the world's history at its starting turn.
    pub fn record(&mut self, world: &mut WorldState, turn: u32) -> Result<(), EngineError> {
        self.step(CommandPhase::Executed, CommandPhase::Recorded)?;
        world
            .history
            .add_command(self.faction, self.command.clone(), turn)?;
        Ok(())
    }
}

/// Follow-up commands enqueued by domain or script code, executed immediately
/// after the current command. Turn bracket commands are rejected.
#[derive(Default)]
pub struct CommandQueue {
    items: VecDeque<(FactionId, Command)>,
}

impl CommandQueue {
    pub fn push(&mut self, faction: FactionId, command: Command) -> Result<(), InvalidCommand> {
        if command.is_turn_bracket() {
            return Err(InvalidCommand::TurnBracketQueued);
        }
        self.items.push_back((faction, command));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The authoritative engine: owns the world, runs the pipeline, keeps the
/// replayable log, and reports defeat/victory.
pub struct Engine {
    world: WorldState,
    settings: Vec<PlayerSettings>,
    queue: CommandQueue,
    on_event: Option<Box<dyn FnMut(&Event) + Send>>,
}

impl Engine {
    pub fn new(
        scenario: Arc<CompiledScenario>,
        script: Arc<dyn RuleScript>,
        settings: &[PlayerSettings],
    ) -> Result<Self, EngineError> {
        let world = WorldState::initialize(scenario, script, settings)?;
        Ok(Self {
            world,
            settings: settings.to_vec(),
            queue: CommandQueue::default(),
            on_event: None,
        })
    }

    pub fn with_default_script(
        scenario: Arc<CompiledScenario>,
        settings: &[PlayerSettings],
    ) -> Result<Self, EngineError> {
        Self::new(scenario, Arc::new(DefaultScript), settings)
    }

    /// Independent engine over a deep copy of the current world, for AI
    /// search and replay exploration. The fork shares no mutable state with
    /// this engine; discard it when done.
    pub fn fork(&self) -> Engine {
        Engine {
            world: self.world.clone_state(),
            settings: self.settings.clone(),
            queue: CommandQueue::default(),
            on_event: None,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn active_faction(&self) -> Option<FactionId> {
        self.world.active_faction_id()
    }

    /// The finished game's outcome, once `game_over` is set.
    pub fn result(&self) -> Option<GameResult> {
        if !self.world.game_over {
            return None;
        }
        let reason = if self.world.winner.is_some() {
            VictoryReason::LastFactionStanding
        } else {
            VictoryReason::MutualElimination
        };
        Some(GameResult {
            winner: self.world.winner,
            reason,
            turn: self.world.turn,
        })
    }

    /// Installs the per-event notification callback. Silent contexts (AI
    /// lookahead) simply leave it unset.
    pub fn set_event_callback(&mut self, callback: Box<dyn FnMut(&Event) + Send>) {
        self.on_event = Some(callback);
    }

    /// Enqueues a command for execution right after the current one.
    pub fn queue_command(
        &mut self,
        faction: FactionId,
        command: Command,
    ) -> Result<(), InvalidCommand> {
        self.queue.push(faction, command)
    }

    /// Validates, expands, executes and records one command, then drains any
    /// queued follow-ups. A rejected command leaves the world untouched.
    pub fn execute_command(
        &mut self,
        faction: FactionId,
        command: Command,
    ) -> Result<Vec<Event>, EngineError> {
        let mut events = self.execute_one(faction, command, true)?;
        while let Some((queued_faction, queued_command)) = self.queue.items.pop_front() {
            if self.world.game_over {
                break;
            }
            // Queued commands re-expand deterministically from their parent on
            // replay, so they are not recorded themselves.
            events.extend(self.execute_one(queued_faction, queued_command, false)?);
        }
        if let Some(callback) = &mut self.on_event {
            for event in &events {
                callback(event);
            }
        }
        Ok(events)
    }

    fn execute_one(
        &mut self,
        faction: FactionId,
        command: Command,
        record: bool,
    ) -> Result<Vec<Event>, EngineError> {
        if self.world.game_over {
            return Err(InvalidCommand::GameOver.into());
        }
        self.world.refresh_valuation();
        let start_turn = self.world.turn;

        let mut run = CommandRun::new(faction, command);
        run.validate(&self.world)?;
        run.expand(&self.world)?;
        let mut events = run.execute(&mut self.world)?;

        self.world.refresh_modifiers();
        self.world.refresh_valuation();

        // Exactly once per command, and never again once the game is over.
        events.extend(self.check_defeat()?);
        events.extend(self.check_victory()?);

        if record {
            run.record(&mut self.world, start_turn)?;
        }
        Ok(events)
    }

    fn check_defeat(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.world.game_over {
            return Ok(Vec::new());
        }
        let doomed: Vec<FactionId> = self
            .world
            .factions
            .iter()
            .filter(|f| f.resigned || f.is_eliminated())
            .map(|f| f.id)
            .collect();

        let mut events = Vec::new();
        for id in doomed {
            info!(faction = id.0, "faction defeated");
            self.world.delete_faction(id)?;
            events.push(Event::FactionDefeated { faction: id });
        }
        Ok(events)
    }

    fn check_victory(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.world.game_over {
            return Ok(Vec::new());
        }
        match self.world.factions.len() {
            0 => {
                self.world.game_over = true;
                self.world.winner = None;
                info!("game over: mutual elimination");
                Ok(vec![Event::GameEnded {
                    winner: None,
                    reason: VictoryReason::MutualElimination,
                }])
            }
            1 => {
                let winner = self.world.factions[0].id;
                let name = self.world.factions[0].name.clone();
                let size = self.world.factions[0].size();
                let strength = self.world.faction_strength(winner);
                let turn = self.world.turn;
                self.world.history.record_faction(
                    winner,
                    &name,
                    turn,
                    FactionEventKind::Victory,
                    size,
                    strength,
                )?;
                self.world.game_over = true;
                self.world.winner = Some(winner);
                info!(faction = winner.0, "game over: last faction standing");
                Ok(vec![Event::GameEnded {
                    winner: Some(winner),
                    reason: VictoryReason::LastFactionStanding,
                }])
            }
            _ => Ok(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn export_history(&self) -> HistoryFile {
        self.world.history.to_file(self.world.scenario().digest)
    }

    /// Rebuilds the world from scratch and replays the persisted log against
    /// it. The log must come from the same scenario content.
    pub fn import_history(&mut self, file: &HistoryFile) -> Result<(), HistoryImportError> {
        if file.version != HISTORY_FILE_VERSION {
            return Err(HistoryImportError::UnsupportedVersion(file.version));
        }
        let expected = self.world.scenario().digest;
        if file.scenario_hash != expected {
            return Err(HistoryImportError::ScenarioHashMismatch {
                expected,
                got: file.scenario_hash,
            });
        }

        let world = WorldState::initialize(
            self.world.scenario_arc(),
            self.world.script(),
            &self.settings,
        )
        .map_err(HistoryImportError::Rebuild)?;

        let mut replayer = Engine {
            world,
            settings: self.settings.clone(),
            queue: CommandQueue::default(),
            on_event: None,
        };
        for (index, recorded) in file.commands.iter().enumerate() {
            replayer
                .execute_command(recorded.faction, recorded.command.clone())
                .map_err(|source| HistoryImportError::CommandFailed { index, source })?;
        }

        self.world = replayer.world;
        Ok(())
    }

    /// Deterministic digest of the current world, for desync detection.
    pub fn state_digest(&self) -> Result<u64, wire::WireError> {
        wire::snapshot_hash(&self.world.snapshot())
    }
}

// ----------------------------------------------------------------------
// Validation helpers
// ----------------------------------------------------------------------

fn require_active(world: &WorldState, faction: FactionId) -> Result<(), InvalidCommand> {
    let f = world
        .faction(faction)
        .ok_or(InvalidCommand::UnknownFaction(faction))?;
    if world.active_faction_id() != Some(faction) {
        return Err(InvalidCommand::NotActiveFaction {
            faction: f.name.clone(),
        });
    }
    Ok(())
}

fn owned_entity<'w>(
    world: &'w WorldState,
    id: EntityId,
    faction: FactionId,
) -> Result<&'w Entity, InvalidCommand> {
    let entity = world.entity(id).ok_or(InvalidCommand::UnknownEntity(id))?;
    if entity.owner != Some(faction) {
        let faction_name = world
            .faction(faction)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| faction.to_string());
        return Err(InvalidCommand::WrongOwner {
            name: entity.name.clone(),
            faction: faction_name,
        });
    }
    Ok(entity)
}

fn unit_of<'w>(
    world: &'w WorldState,
    id: EntityId,
    faction: FactionId,
) -> Result<&'w Entity, InvalidCommand> {
    let entity = owned_entity(world, id, faction)?;
    if entity.kind != EntityKind::Unit {
        return Err(InvalidCommand::NotAUnit {
            name: entity.name.clone(),
        });
    }
    Ok(entity)
}

/// Validates a movement path and returns its total cost.
fn movement_cost(
    world: &WorldState,
    unit: &Entity,
    path: &[ironmark_protocol::Coord],
) -> Result<i64, InvalidCommand> {
    let Some(mut previous) = unit.site else {
        return Err(InvalidCommand::NotPlaced {
            name: unit.name.clone(),
        });
    };
    if path.is_empty() {
        return Err(InvalidCommand::InvalidPath {
            name: unit.name.clone(),
            reason: "path is empty".into(),
        });
    }

    let mut cost = 0_i64;
    for step in path {
        if !previous.is_adjacent(*step) {
            return Err(InvalidCommand::InvalidPath {
                name: unit.name.clone(),
                reason: format!("{previous} to {step} is not a single step"),
            });
        }
        let Some(site) = world.site(*step) else {
            return Err(InvalidCommand::UnknownSite(*step));
        };
        let hostile = site.units.iter().any(|other| {
            world
                .entity(*other)
                .is_some_and(|u| u.owner != unit.owner)
        });
        if hostile {
            return Err(InvalidCommand::InvalidPath {
                name: unit.name.clone(),
                reason: format!("{step} is occupied by another faction"),
            });
        }
        cost += site.move_cost().max(1);
        previous = *step;
    }

    let have = unit.counter(world.scenario().vars.moves_left);
    if cost > have {
        return Err(InvalidCommand::OutOfMovement {
            name: unit.name.clone(),
            need: cost,
            have,
        });
    }
    Ok(cost)
}

fn validate_build(
    world: &WorldState,
    faction: FactionId,
    orders: &[ironmark_protocol::BuildOrder],
) -> Result<(), EngineError> {
    require_active(world, faction)?;
    let f = world
        .faction(faction)
        .ok_or(InvalidCommand::UnknownFaction(faction))?;
    if orders.is_empty() {
        return Err(InvalidCommand::Rule("build command carries no orders".into()).into());
    }

    let scenario = world.scenario();
    let mut cost_totals: BTreeMap<VariableId, i64> = BTreeMap::new();
    let mut total_count = 0_i64;

    for order in orders {
        let Some(class) = scenario.entity_classes.get(order.class.raw as usize) else {
            return Err(InvalidCommand::NotBuildable {
                class: format!("#{}", order.class.raw),
            }
            .into());
        };
        if order.count == 0 {
            return Err(InvalidCommand::Rule(format!(
                "build order for {} requests zero instances",
                class.name
            ))
            .into());
        }
        if !matches!(class.kind, EntityKind::Unit | EntityKind::Upgrade) {
            return Err(InvalidCommand::NotBuildable {
                class: class.name.clone(),
            }
            .into());
        }

        let effective_limit = if class.unique { 1 } else { class.build_limit };
        if effective_limit > 0 {
            let existing = f
                .collection(class.kind)
                .map(|collection| {
                    collection
                        .iter()
                        .filter(|id| {
                            world.entity(**id).is_some_and(|e| e.class == order.class)
                        })
                        .count() as u32
                })
                .unwrap_or(0);
            if existing + order.count > effective_limit {
                return Err(InvalidCommand::BuildLimitReached {
                    faction: f.name.clone(),
                    class: class.name.clone(),
                }
                .into());
            }
        }

        total_count += order.count as i64;
        for (resource, amount) in &class.cost {
            *cost_totals.entry(*resource).or_default() += amount * order.count as i64;
        }
    }

    if f.counter(scenario.vars.builds) < total_count {
        return Err(InvalidCommand::NoBuildCapacity {
            faction: f.name.clone(),
            class: scenario
                .entity_class(orders[0].class)
                .name
                .clone(),
        }
        .into());
    }

    for (resource, need) in cost_totals {
        let have = f.resource(resource);
        if have < need {
            return Err(InvalidCommand::NotEnoughResources {
                faction: f.name.clone(),
                resource: scenario.variable(resource).data_id.clone(),
                class: scenario.entity_class(orders[0].class).name.clone(),
                need,
                have,
            }
            .into());
        }
    }
    Ok(())
}

fn validate_attack(
    world: &WorldState,
    faction: FactionId,
    attacker: EntityId,
    target: EntityId,
) -> Result<(), EngineError> {
    let a = unit_of(world, attacker, faction)?;
    let Some(attacker_at) = a.site else {
        return Err(InvalidCommand::NotPlaced {
            name: a.name.clone(),
        }
        .into());
    };
    let t = world
        .entity(target)
        .ok_or(InvalidCommand::UnknownEntity(target))?;
    let Some(target_at) = t.site else {
        return Err(InvalidCommand::NotPlaced {
            name: t.name.clone(),
        }
        .into());
    };
    if t.owner == a.owner {
        return Err(InvalidCommand::Rule(format!(
            "{} and {} belong to the same faction",
            a.name, t.name
        ))
        .into());
    }

    let scenario = world.scenario();
    let class = scenario.entity_class(a.class);
    if let Some(ammunition) = class.ammunition {
        if a.resource(ammunition) <= 0 {
            return Err(InvalidCommand::OutOfAmmunition {
                name: a.name.clone(),
                resource: scenario.variable(ammunition).data_id.clone(),
            }
            .into());
        }
    }

    let range = a.attribute(scenario.vars.attack_range);
    if attacker_at.distance(target_at) as i64 > range {
        return Err(InvalidCommand::OutOfRange {
            name: a.name.clone(),
            target: t.name.clone(),
        }
        .into());
    }
    if !Finder::in_range_from(world, attacker, attacker_at, target_at)? {
        return Err(InvalidCommand::NoLineOfSight {
            name: a.name.clone(),
            target: t.name.clone(),
        }
        .into());
    }
    Ok(())
}
