use ironmark_protocol::{Event, Instruction, VariableTarget};

use crate::error::{EngineError, InvalidCommand};
use crate::scenario::VariableCategory;
use crate::world::WorldState;

/// Result of executing one instruction.
#[derive(Debug, Default)]
pub struct InstructionOutcome {
    /// Whether any state changed.
    pub changed: bool,
    pub events: Vec<Event>,
    /// Entities this instruction created.
    pub created: Vec<ironmark_protocol::EntityId>,
}

impl InstructionOutcome {
    fn unchanged() -> Self {
        Self::default()
    }
}

/// Executes one atomic instruction against the world.
///
/// Commands may be composed of instructions queued by nested domain logic,
/// so every executor re-validates the preconditions its target did not
/// satisfy at enqueue time instead of trusting the expansion.
pub fn execute_instruction(
    world: &mut WorldState,
    instruction: &Instruction,
) -> Result<InstructionOutcome, EngineError> {
    match instruction {
        Instruction::CreateEntity { class, owner, name } => {
            let id = world.create_entity(*class, Some(*owner), name.clone())?;
            let entity = world
                .entity(id)
                .expect("entity exists immediately after creation");
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::EntityCreated {
                    entity: id,
                    class: *class,
                    owner: *owner,
                    name: entity.name.clone(),
                }],
                created: vec![id],
            })
        }

        Instruction::DeleteEntity { entity } => {
            let at = world.entity(*entity).and_then(|e| e.site);
            if !world.delete_entity(*entity)? {
                return Ok(InstructionOutcome::unchanged());
            }
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::EntityDeleted {
                    entity: *entity,
                    at,
                }],
                created: Vec::new(),
            })
        }

        Instruction::PlaceEntity { entity, at } => {
            let from = world
                .entity(*entity)
                .ok_or(InvalidCommand::UnknownEntity(*entity))?
                .site;
            if !world.place_entity(*entity, Some(*at))? {
                return Ok(InstructionOutcome::unchanged());
            }
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::EntityPlaced {
                    entity: *entity,
                    at: *at,
                    from,
                }],
                created: Vec::new(),
            })
        }

        Instruction::SetOwner { entity, owner } => {
            if !world.set_owner(*entity, *owner)? {
                return Ok(InstructionOutcome::unchanged());
            }
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::OwnerChanged {
                    entity: *entity,
                    owner: *owner,
                }],
                created: Vec::new(),
            })
        }

        Instruction::SetValue {
            target,
            variable,
            value,
            initial,
        } => write_value(world, *target, *variable, *value, *initial, false),

        Instruction::AdjustValue {
            target,
            variable,
            delta,
        } => write_value(world, *target, *variable, *delta, false, true),

        Instruction::SetEntityClass { entity, class } => {
            if !world.set_entity_class(*entity, *class)? {
                return Ok(InstructionOutcome::unchanged());
            }
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::EntityTransformed {
                    entity: *entity,
                    class: *class,
                }],
                created: Vec::new(),
            })
        }

        Instruction::SetEntityName { entity, name } => {
            if !world.set_entity_name(*entity, name.clone())? {
                return Ok(InstructionOutcome::unchanged());
            }
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::EntityRenamed {
                    entity: *entity,
                    name: name.clone(),
                }],
                created: Vec::new(),
            })
        }

        Instruction::ResignFaction { faction } => {
            let Some(f) = world.faction_mut(*faction) else {
                return Err(InvalidCommand::UnknownFaction(*faction).into());
            };
            if f.resigned {
                return Ok(InstructionOutcome::unchanged());
            }
            f.resigned = true;
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::FactionResigned { faction: *faction }],
                created: Vec::new(),
            })
        }

        Instruction::AdvanceFaction => {
            let turn = world.turn;
            let faction = world
                .active_faction_id()
                .ok_or_else(|| InvalidCommand::Rule("no faction left to advance".into()))?;
            world.advance_faction()?;
            Ok(InstructionOutcome {
                changed: true,
                events: vec![Event::TurnEnded { turn, faction }],
                created: Vec::new(),
            })
        }

        Instruction::Message { text, at } => Ok(InstructionOutcome {
            changed: false,
            events: vec![Event::Message {
                text: text.clone(),
                at: *at,
            }],
            created: Vec::new(),
        }),
    }
}

fn write_value(
    world: &mut WorldState,
    target: VariableTarget,
    variable: ironmark_protocol::VariableId,
    amount: i64,
    initial: bool,
    relative: bool,
) -> Result<InstructionOutcome, EngineError> {
    let value = if relative {
        world.variable_value(target, variable)? + amount
    } else {
        amount
    };

    if !world.set_variable(target, variable, value, initial)? {
        return Ok(InstructionOutcome::unchanged());
    }

    let mut events = vec![Event::ValueChanged {
        target,
        variable,
        value: world.variable_value(target, variable)?,
    }];

    // Resource changes can deplete an entity out of the world.
    if let VariableTarget::Entity { entity } = target {
        let is_resource = world
            .scenario()
            .variables
            .get(variable.raw as usize)
            .is_some_and(|class| class.category == VariableCategory::Resource);
        if is_resource {
            let at = world.entity(entity).and_then(|e| e.site);
            if world.apply_depletion(entity)? {
                events.push(Event::EntityDeleted { entity, at });
            }
        }
    }

    Ok(InstructionOutcome {
        changed: true,
        events,
        created: Vec::new(),
    })
}
