use std::collections::{BTreeMap, HashMap};

use ironmark_protocol::{
    wire::hash_bytes_fnv1a64, Coord, EntityClassId, EntityKind, FactionClassId, VariableId,
};
use serde::Deserialize;
use thiserror::Error;

use crate::scenario::{
    build_template, AreaDef, CompiledScenario, EntityClass, FactionClass, MapDef, ModifierDef,
    ModifierScope, VariableCategory, VariableClass, WellKnownVariables,
};
use crate::variable::VariableHolder;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing referenced id: {0}")]
    MissingId(String),
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

pub enum ScenarioSource<'a> {
    Embedded,
    Path(String),
    Bytes(&'a [u8]),
}

fn default_scale() -> i64 {
    1
}

fn default_move_cost() -> i64 {
    1
}

fn default_builds_per_turn() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    name: String,
    map: RawMap,
    variables: BTreeMap<String, RawVariable>,
    entities: BTreeMap<String, RawEntity>,
    factions: BTreeMap<String, RawFaction>,
    #[serde(default)]
    areas: Vec<RawArea>,
}

#[derive(Debug, Deserialize)]
struct RawMap {
    width: u32,
    height: u32,
    default_terrain: String,
}

#[derive(Debug, Deserialize)]
struct RawVariable {
    name: String,
    category: VariableCategory,
    minimum: i64,
    maximum: i64,
    #[serde(default = "default_scale")]
    scale: i64,
    #[serde(default)]
    limited: bool,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    kind: EntityKind,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    background: bool,
    #[serde(default)]
    blocks_attack: bool,
    #[serde(default = "default_move_cost")]
    move_cost: i64,
    #[serde(default)]
    ammunition: Option<String>,
    #[serde(default)]
    needs_sight: bool,
    #[serde(default)]
    cost: BTreeMap<String, i64>,
    #[serde(default)]
    build_limit: u32,
    #[serde(default)]
    attributes: BTreeMap<String, i64>,
    #[serde(default)]
    counters: BTreeMap<String, i64>,
    #[serde(default)]
    resources: BTreeMap<String, i64>,
    #[serde(default)]
    decisive: Vec<String>,
    #[serde(default)]
    modifiers: Vec<RawModifier>,
}

#[derive(Debug, Deserialize)]
struct RawModifier {
    variable: String,
    delta: i64,
    scope: ModifierScope,
}

#[derive(Debug, Deserialize)]
struct RawFaction {
    name: String,
    #[serde(default)]
    home: Option<Coord>,
    #[serde(default)]
    counters: BTreeMap<String, i64>,
    #[serde(default)]
    resources: BTreeMap<String, i64>,
    #[serde(default = "default_builds_per_turn")]
    builds_per_turn: i64,
}

#[derive(Debug, Deserialize)]
struct RawArea {
    from: Coord,
    to: Coord,
    #[serde(default)]
    owner: Option<String>,
    entities: Vec<String>,
}

pub fn load_scenario(source: ScenarioSource<'_>) -> Result<CompiledScenario, ScenarioError> {
    let text = match source {
        ScenarioSource::Embedded => include_str!("../../data/base/scenario.yaml").to_owned(),
        ScenarioSource::Path(path) => std::fs::read_to_string(path)?,
        ScenarioSource::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    };
    let raw: RawScenario = serde_yaml::from_str(&text)?;
    compile(raw, hash_bytes_fnv1a64(text.as_bytes()))
}

fn compile(raw: RawScenario, digest: u64) -> Result<CompiledScenario, ScenarioError> {
    // Dense runtime ids are assigned in BTreeMap order, which is stable for a
    // given scenario text.
    let mut variables = Vec::with_capacity(raw.variables.len());
    let mut variable_ids = HashMap::new();
    for (data_id, var) in &raw.variables {
        let id = VariableId::new(variables.len() as u16);
        if var.minimum > var.maximum {
            return Err(ScenarioError::Invalid(format!(
                "variable {data_id} has minimum above maximum"
            )));
        }
        variables.push(VariableClass {
            data_id: data_id.clone(),
            name: var.name.clone(),
            category: var.category,
            minimum: var.minimum,
            maximum: var.maximum,
            scale: var.scale,
            limited: var.limited,
        });
        variable_ids.insert(data_id.clone(), id);
    }

    let lookup_var = |table: &HashMap<String, VariableId>, data_id: &str| {
        table
            .get(data_id)
            .copied()
            .ok_or_else(|| ScenarioError::MissingId(data_id.to_owned()))
    };

    let require = |data_id: &str| -> Result<VariableId, ScenarioError> {
        lookup_var(&variable_ids, data_id)
    };
    let vars = WellKnownVariables {
        movement: require("movement")?,
        attack: require("attack")?,
        defense: require("defense")?,
        attack_range: require("attack-range")?,
        sight: require("sight")?,
        hits: require("hits")?,
        moves_left: require("moves-left")?,
        builds: require("builds")?,
    };

    let resolve_values = |entries: &BTreeMap<String, i64>| -> Result<Vec<(VariableId, i64)>, ScenarioError> {
        entries
            .iter()
            .map(|(data_id, value)| Ok((lookup_var(&variable_ids, data_id)?, *value)))
            .collect()
    };

    let mut entity_classes = Vec::with_capacity(raw.entities.len());
    let mut entity_class_ids = HashMap::new();
    for (data_id, entity) in &raw.entities {
        let id = EntityClassId::new(entity_classes.len() as u16);
        if entity.background && entity.kind != EntityKind::Terrain {
            return Err(ScenarioError::Invalid(format!(
                "class {data_id} is background but not a terrain"
            )));
        }

        let attributes = resolve_values(&entity.attributes)?;
        let mut counters = resolve_values(&entity.counters)?;
        let resources = resolve_values(&entity.resources)?;

        // Units always carry the per-turn movement counter.
        if entity.kind == EntityKind::Unit && !counters.iter().any(|(v, _)| *v == vars.moves_left)
        {
            let movement = attributes
                .iter()
                .find(|(v, _)| *v == vars.movement)
                .map(|(_, value)| *value)
                .unwrap_or(0);
            counters.push((vars.moves_left, movement));
        }

        let decisive = entity
            .decisive
            .iter()
            .map(|data_id| {
                let id = lookup_var(&variable_ids, data_id)?;
                if variables[id.raw as usize].category != VariableCategory::Resource {
                    return Err(ScenarioError::Invalid(format!(
                        "decisive variable {data_id} is not a resource"
                    )));
                }
                Ok(id)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let modifiers = entity
            .modifiers
            .iter()
            .map(|m| {
                Ok(ModifierDef {
                    variable: lookup_var(&variable_ids, &m.variable)?,
                    delta: m.delta,
                    scope: m.scope,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        let ammunition = entity
            .ammunition
            .as_deref()
            .map(|data_id| lookup_var(&variable_ids, data_id))
            .transpose()?;

        entity_classes.push(EntityClass {
            data_id: data_id.clone(),
            name: entity.name.clone(),
            kind: entity.kind,
            unique: entity.unique,
            background: entity.background,
            blocks_attack: entity.blocks_attack,
            move_cost: entity.move_cost,
            ammunition,
            needs_sight: entity.needs_sight,
            cost: resolve_values(&entity.cost)?,
            build_limit: entity.build_limit,
            attribute_template: build_template(&variables, &attributes, VariableHolder::Entity),
            counter_template: build_template(&variables, &counters, VariableHolder::Entity),
            resource_template: build_template(&variables, &resources, VariableHolder::Entity),
            attributes,
            counters,
            resources,
            decisive,
            modifiers,
        });
        entity_class_ids.insert(data_id.clone(), id);
    }

    let mut faction_classes = Vec::with_capacity(raw.factions.len());
    let mut faction_class_ids = HashMap::new();
    for (data_id, faction) in &raw.factions {
        let id = FactionClassId::new(faction_classes.len() as u16);
        let mut counters = resolve_values(&faction.counters)?;
        if !counters.iter().any(|(v, _)| *v == vars.builds) {
            counters.push((vars.builds, faction.builds_per_turn));
        }
        let resources = resolve_values(&faction.resources)?;

        faction_classes.push(FactionClass {
            data_id: data_id.clone(),
            name: faction.name.clone(),
            home: faction.home,
            builds_per_turn: faction.builds_per_turn,
            counter_template: build_template(&variables, &counters, VariableHolder::Faction),
            resource_template: build_template(&variables, &resources, VariableHolder::Faction),
            counters,
            resources,
        });
        faction_class_ids.insert(data_id.clone(), id);
    }

    let default_terrain = entity_class_ids
        .get(&raw.map.default_terrain)
        .copied()
        .ok_or_else(|| ScenarioError::MissingId(raw.map.default_terrain.clone()))?;
    {
        let class = &entity_classes[default_terrain.raw as usize];
        if !(class.kind == EntityKind::Terrain && class.background) {
            return Err(ScenarioError::Invalid(format!(
                "default terrain {} must be a background terrain",
                raw.map.default_terrain
            )));
        }
    }
    if raw.map.width == 0 || raw.map.height == 0 {
        return Err(ScenarioError::Invalid("map has zero dimension".into()));
    }

    let in_map = |c: Coord| {
        c.x >= 0 && c.y >= 0 && (c.x as u32) < raw.map.width && (c.y as u32) < raw.map.height
    };
    let areas = raw
        .areas
        .iter()
        .map(|area| {
            if !in_map(area.from) || !in_map(area.to) {
                return Err(ScenarioError::Invalid(format!(
                    "area {}..{} exceeds the map",
                    area.from, area.to
                )));
            }
            let owner = area
                .owner
                .as_deref()
                .map(|data_id| {
                    faction_class_ids
                        .get(data_id)
                        .copied()
                        .ok_or_else(|| ScenarioError::MissingId(data_id.to_owned()))
                })
                .transpose()?;
            let entities = area
                .entities
                .iter()
                .map(|data_id| {
                    entity_class_ids
                        .get(data_id)
                        .copied()
                        .ok_or_else(|| ScenarioError::MissingId(data_id.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AreaDef {
                from: area.from,
                to: area.to,
                owner,
                entities,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledScenario {
        name: raw.name,
        variables,
        entity_classes,
        faction_classes,
        variable_ids,
        entity_class_ids,
        faction_class_ids,
        map: MapDef {
            width: raw.map.width,
            height: raw.map.height,
            default_terrain,
        },
        areas,
        vars,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_scenario_loads_and_compiles() {
        let scenario = load_scenario(ScenarioSource::Embedded).expect("embedded scenario");
        assert!(scenario.map.width > 0);
        assert!(scenario.faction_classes.len() >= 2);
        assert!(scenario.entity_class_id("infantry").is_some());

        let infantry = scenario
            .entity_class(scenario.entity_class_id("infantry").unwrap());
        assert_eq!(infantry.kind, EntityKind::Unit);
        // The moves-left counter is injected from the movement attribute.
        assert!(infantry
            .counters
            .iter()
            .any(|(v, _)| *v == scenario.vars.moves_left));
    }

    #[test]
    fn digest_is_stable_for_identical_text() {
        let a = load_scenario(ScenarioSource::Embedded).unwrap();
        let b = load_scenario(ScenarioSource::Embedded).unwrap();
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn missing_reference_is_reported_by_id() {
        let yaml = br#"
name: Broken
map: { width: 4, height: 4, default_terrain: swamp }
variables: {}
entities: {}
factions: {}
"#;
        let err = load_scenario(ScenarioSource::Bytes(yaml)).unwrap_err();
        assert!(matches!(err, ScenarioError::MissingId(_)));
    }
}
