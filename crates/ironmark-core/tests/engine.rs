//! End-to-end tests of the command pipeline against the embedded scenario.

use std::sync::Arc;

use ironmark_core::{
    load_scenario, CompiledScenario, Engine, Finder, ScenarioSource,
};
use ironmark_protocol::{
    wire, BuildOrder, Command, Coord, EntityEventKind, EntityId, Event, FactionEventKind,
};

fn scenario() -> Arc<CompiledScenario> {
    Arc::new(load_scenario(ScenarioSource::Embedded).expect("embedded scenario"))
}

fn engine_on(scenario: Arc<CompiledScenario>) -> Engine {
    Engine::with_default_script(scenario, &[]).expect("engine initializes")
}

fn created_ids(events: &[Event]) -> Vec<EntityId> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::EntityCreated { entity, .. } => Some(*entity),
            _ => None,
        })
        .collect()
}

#[test]
fn build_spends_resources_and_records_history() {
    let scenario = scenario();
    let gold = scenario.variable_id("gold").unwrap();
    let infantry = scenario.entity_class_id("infantry").unwrap();
    let mut engine = engine_on(scenario);

    let azure = engine.active_faction().unwrap();
    assert_eq!(engine.world().faction(azure).unwrap().resource(gold), 100);
    assert_eq!(engine.world().faction(azure).unwrap().units.len(), 1);

    let events = engine
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: infantry,
                    count: 1,
                }],
            },
        )
        .expect("build succeeds");

    let faction = engine.world().faction(azure).unwrap();
    assert_eq!(faction.resource(gold), 60);
    assert_eq!(faction.units.len(), 2);

    let created = created_ids(&events);
    assert_eq!(created.len(), 1);
    let unit = engine.world().entity(created[0]).expect("unit is live");
    assert_eq!(unit.owner, Some(azure));
    assert!(unit.site.is_none(), "built units start in the inventory");

    let trail = engine.world().history.entity(created[0]).unwrap();
    assert!(matches!(
        trail.events[0].kind,
        EntityEventKind::Created { class } if class == infantry
    ));
    assert_eq!(trail.events[0].turn, 1);
    assert_eq!(engine.world().history.commands.len(), 1);
}

#[test]
fn rejected_build_leaves_the_world_untouched() {
    let scenario = scenario();
    let gold = scenario.variable_id("gold").unwrap();
    let infantry = scenario.entity_class_id("infantry").unwrap();
    let mut engine = engine_on(scenario);
    let azure = engine.active_faction().unwrap();

    // Five infantry cost 200; the faction holds 100.
    let err = engine
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: infantry,
                    count: 5,
                }],
            },
        )
        .unwrap_err();
    assert!(err.is_rejection());

    let faction = engine.world().faction(azure).unwrap();
    assert_eq!(faction.resource(gold), 100);
    assert_eq!(faction.units.len(), 1);
    assert!(engine.world().history.commands.is_empty());
}

#[test]
fn turn_brackets_rotate_factions_and_advance_full_turns() {
    let scenario = scenario();
    let mut engine = engine_on(scenario);
    let azure = engine.active_faction().unwrap();

    engine.execute_command(azure, Command::EndTurn).unwrap();
    let crimson = engine.active_faction().unwrap();
    assert_ne!(crimson, azure);
    assert_eq!(engine.world().turn, 1);

    let events = engine.execute_command(crimson, Command::BeginTurn).unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TurnStarted { turn: 1, .. })));
    let trail = engine.world().history.faction(crimson).unwrap();
    assert!(trail
        .events
        .iter()
        .any(|e| matches!(e.kind, FactionEventKind::Advanced)));

    engine.execute_command(crimson, Command::EndTurn).unwrap();
    assert_eq!(engine.world().turn, 2);
    assert_eq!(engine.active_faction(), Some(azure));

    engine.execute_command(azure, Command::BeginTurn).unwrap();
    assert_eq!(engine.world().history.full_turns, 2);

    // Out-of-turn commands are rejected by name.
    let err = engine.execute_command(crimson, Command::BeginTurn).unwrap_err();
    assert!(err.is_rejection());
}

#[test]
fn attack_range_is_checked_before_line_of_sight() {
    let scenario = scenario();
    let artillery_class = scenario.entity_class_id("artillery").unwrap();
    let mut engine = engine_on(scenario.clone());
    let azure = engine.active_faction().unwrap();

    let events = engine
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: artillery_class,
                    count: 1,
                }],
            },
        )
        .unwrap();
    let artillery = created_ids(&events)[0];

    // Three sites apart with range 2: out of range, regardless of sight.
    let world = engine.world();
    assert!(!Finder::in_range_from(
        world,
        artillery,
        Coord { x: 0, y: 0 },
        Coord { x: 3, y: 0 }
    )
    .unwrap());

    // Two apart but shooting across forest: range admits, sight does not.
    assert!(!Finder::in_range_from(
        world,
        artillery,
        Coord { x: 3, y: 3 },
        Coord { x: 5, y: 3 }
    )
    .unwrap());

    // Two apart over open plains.
    assert!(Finder::in_range_from(
        world,
        artillery,
        Coord { x: 1, y: 5 },
        Coord { x: 3, y: 5 }
    )
    .unwrap());

    // Placed-unit variant: the two home armies are nine sites apart.
    engine
        .execute_command(
            azure,
            Command::Deploy {
                entity: artillery,
                at: Coord { x: 10, y: 8 },
            },
        )
        .unwrap();
    let crimson_unit = engine.world().factions[1].units[0];
    assert!(!Finder::are_units_in_attack_range(engine.world(), artillery, crimson_unit).unwrap());
}

#[test]
fn reachable_sites_use_the_smallest_movement_of_the_group() {
    let scenario = scenario();
    let scout_class = scenario.entity_class_id("scout").unwrap();
    let mut engine = engine_on(scenario);
    let azure = engine.active_faction().unwrap();

    let events = engine
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: scout_class,
                    count: 1,
                }],
            },
        )
        .unwrap();
    let scout = created_ids(&events)[0];
    engine
        .execute_command(
            azure,
            Command::Deploy {
                entity: scout,
                at: Coord { x: 10, y: 8 },
            },
        )
        .unwrap();

    let infantry = engine.world().faction(azure).unwrap().units[0];
    let world = engine.world();

    let solo = Finder::reachable_sites(world, &[scout]).unwrap();
    let group = Finder::reachable_sites(world, &[scout, infantry]).unwrap();
    // Scout moves 5, infantry 3: the pair is held back to infantry pace.
    assert!(solo.sites.len() > group.sites.len());
    assert!(solo.contains(Coord { x: 5, y: 8 }));
    assert!(!group.contains(Coord { x: 5, y: 8 }));
    assert!(group.contains(Coord { x: 8, y: 8 }));
}

#[test]
fn queued_commands_run_after_the_current_one_and_brackets_are_rejected() {
    let scenario = scenario();
    let infantry_class = scenario.entity_class_id("infantry").unwrap();
    let mut engine = engine_on(scenario);
    let azure = engine.active_faction().unwrap();
    let unit = engine.world().faction(azure).unwrap().units[0];

    assert!(engine.queue_command(azure, Command::EndTurn).is_err());
    assert!(engine.queue_command(azure, Command::BeginTurn).is_err());

    engine
        .queue_command(
            azure,
            Command::Rename {
                entity: unit,
                name: "Home Guard".into(),
            },
        )
        .unwrap();

    let events = engine
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: infantry_class,
                    count: 1,
                }],
            },
        )
        .unwrap();

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::EntityRenamed { .. })));
    assert_eq!(engine.world().entity(unit).unwrap().name, "Home Guard");
    // The queued rename is derived, not recorded.
    assert_eq!(engine.world().history.commands.len(), 1);
}

const DUEL_SCENARIO: &[u8] = br#"
name: Duel
map: { width: 5, height: 1, default_terrain: plains }
variables:
  movement: { name: Movement, category: attribute, minimum: 0, maximum: 99 }
  attack: { name: Attack, category: attribute, minimum: 0, maximum: 99 }
  defense: { name: Defense, category: attribute, minimum: 0, maximum: 99 }
  attack-range: { name: Attack Range, category: attribute, minimum: 0, maximum: 9 }
  sight: { name: Sight, category: attribute, minimum: 0, maximum: 9 }
  hits: { name: Hits, category: resource, minimum: 0, maximum: 100, limited: true }
  gold: { name: Gold, category: resource, minimum: 0, maximum: 99999 }
  moves-left: { name: Moves Left, category: resource, minimum: 0, maximum: 99 }
  builds: { name: Builds, category: resource, minimum: 0, maximum: 99 }
entities:
  plains: { name: Plains, kind: terrain, background: true, move_cost: 1 }
  militia:
    name: Militia
    kind: unit
    attributes: { movement: 2, attack: 4, defense: 1, attack-range: 1, sight: 2 }
    resources: { hits: 3 }
    decisive: [hits]
factions:
  alpha: { name: Alpha }
  bravo: { name: Bravo }
areas:
  - { from: { x: 0, y: 0 }, to: { x: 0, y: 0 }, owner: alpha, entities: [militia] }
  - { from: { x: 3, y: 0 }, to: { x: 3, y: 0 }, owner: bravo, entities: [militia] }
"#;

#[test]
fn lethal_attack_depletes_the_defender_and_ends_the_game() {
    let scenario = Arc::new(load_scenario(ScenarioSource::Bytes(DUEL_SCENARIO)).unwrap());
    let mut engine = engine_on(scenario);
    let alpha = engine.active_faction().unwrap();
    let attacker = engine.world().factions[0].units[0];
    let defender = engine.world().factions[1].units[0];
    let bravo = engine.world().factions[1].id;

    engine
        .execute_command(
            alpha,
            Command::Move {
                unit: attacker,
                path: vec![Coord { x: 1, y: 0 }, Coord { x: 2, y: 0 }],
            },
        )
        .unwrap();

    let events = engine
        .execute_command(
            alpha,
            Command::Attack {
                attacker,
                target: defender,
            },
        )
        .unwrap();

    // Damage 4 against 3 hits: the defender depletes out of the world, the
    // faction follows, and the game ends in the same command.
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::EntityDeleted { entity, .. } if *entity == defender)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::FactionDefeated { faction } if *faction == bravo)));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::GameEnded {
            winner: Some(winner),
            ..
        } if *winner == alpha
    )));

    let world = engine.world();
    assert!(world.game_over);
    assert_eq!(world.winner, Some(alpha));
    assert!(world.entity(defender).is_none());
    assert!(world.faction(bravo).is_none());

    let result = engine.result().expect("game is over");
    assert_eq!(result.winner, Some(alpha));
    assert_eq!(
        result.reason,
        ironmark_protocol::VictoryReason::LastFactionStanding
    );

    let bravo_trail = world.history.faction(bravo).unwrap();
    assert!(bravo_trail
        .events
        .iter()
        .any(|e| matches!(e.kind, FactionEventKind::Deleted)));
    let alpha_trail = world.history.faction(alpha).unwrap();
    assert!(alpha_trail
        .events
        .iter()
        .any(|e| matches!(e.kind, FactionEventKind::Victory)));

    // Nothing runs after game over.
    let err = engine
        .execute_command(alpha, Command::EndTurn)
        .unwrap_err();
    assert!(err.is_rejection());
}

#[test]
fn forked_engines_explore_alternate_futures_in_isolation() {
    let scenario = scenario();
    let infantry_class = scenario.entity_class_id("infantry").unwrap();
    let gold = scenario.variable_id("gold").unwrap();
    let engine = engine_on(scenario);
    let azure = engine.active_faction().unwrap();
    let digest_before = engine.state_digest().unwrap();

    let mut lookahead = engine.fork();
    lookahead
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: infantry_class,
                    count: 2,
                }],
            },
        )
        .unwrap();

    assert_eq!(
        lookahead.world().faction(azure).unwrap().resource(gold),
        20
    );
    assert_eq!(engine.world().faction(azure).unwrap().resource(gold), 100);
    assert_eq!(engine.state_digest().unwrap(), digest_before);
}

#[test]
fn exported_history_replays_to_an_identical_world() {
    let scenario = scenario();
    let infantry_class = scenario.entity_class_id("infantry").unwrap();
    let mut engine = engine_on(scenario.clone());
    let azure = engine.active_faction().unwrap();

    engine
        .execute_command(
            azure,
            Command::Build {
                orders: vec![BuildOrder {
                    class: infantry_class,
                    count: 1,
                }],
            },
        )
        .unwrap();
    engine.execute_command(azure, Command::EndTurn).unwrap();
    let crimson = engine.active_faction().unwrap();
    engine.execute_command(crimson, Command::BeginTurn).unwrap();
    engine.execute_command(crimson, Command::EndTurn).unwrap();
    engine.execute_command(azure, Command::BeginTurn).unwrap();

    let digest = engine.state_digest().unwrap();
    let file = engine.export_history();
    assert_eq!(file.full_turns, 2);

    let mut replica = engine_on(scenario);
    replica.import_history(&file).unwrap();
    assert_eq!(replica.state_digest().unwrap(), digest);
    assert_eq!(
        replica.export_history().commands.len(),
        file.commands.len()
    );

    // The JSON wire round-trips the log as skippable named elements.
    let json = wire::serialize_history_json(&file).unwrap();
    let (decoded, skipped) = wire::deserialize_history_json(&json).unwrap();
    assert!(skipped.is_empty());
    assert_eq!(decoded.commands.len(), file.commands.len());
}

#[test]
fn history_import_rejects_a_foreign_scenario_log() {
    let base = scenario();
    let mut engine = engine_on(base);
    let mut file = engine.export_history();
    file.scenario_hash ^= 0xdead_beef;
    let err = engine.import_history(&file).unwrap_err();
    assert!(matches!(
        err,
        ironmark_core::HistoryImportError::ScenarioHashMismatch { .. }
    ));
}
