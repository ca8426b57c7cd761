use super::{ChangeAction, Entity, WorldChange, WorldState};
use serde_json::Value;
use tracing::warn;

/// Builds the successor of `state` by applying `changes` in order.
///
/// The input snapshot is left untouched. No conflict checking happens here:
/// the arbitrator that produced the list owns its consistency. Changes that
/// cannot be applied (unknown entity, wrong value shape) are skipped with a
/// warning.
pub fn apply_changes(state: &WorldState, changes: &[WorldChange]) -> WorldState {
    let mut entities = state.entities.clone();

    for change in changes {
        match change.action {
            ChangeAction::Delete => {
                entities.retain(|e| e.id != change.entity_id);
            }
            ChangeAction::Update => apply_update(&mut entities, change),
            ChangeAction::Create => apply_create(&mut entities, change),
        }
    }

    WorldState {
        room_id: state.room_id.clone(),
        turn_mode: state.turn_mode,
        agent_timeout_seconds: state.agent_timeout_seconds,
        environment: state.environment.clone(),
        entities,
    }
}

fn apply_update(entities: &mut [Entity], change: &WorldChange) {
    let Some(entity) = entities.iter_mut().find(|e| e.id == change.entity_id) else {
        warn!(entity_id = %change.entity_id, "UPDATE on unknown entity, skipping");
        return;
    };
    let (Some(attribute), Some(new_value)) = (change.attribute.as_deref(), &change.value_new)
    else {
        warn!(entity_id = %change.entity_id, "UPDATE without attribute or value, skipping");
        return;
    };

    match attribute {
        "attributes" => match serde_json::from_value(new_value.clone()) {
            Ok(map) => entity.attributes = map,
            Err(e) => warn!(
                entity_id = %change.entity_id,
                error = %e,
                "UPDATE of attributes is not an object, skipping"
            ),
        },
        "name" => match new_value {
            Value::String(name) => entity.name = name.clone(),
            _ => warn!(entity_id = %change.entity_id, "UPDATE of name is not a string, skipping"),
        },
        "tags" => match serde_json::from_value(new_value.clone()) {
            Ok(tags) => entity.tags = tags,
            Err(e) => warn!(
                entity_id = %change.entity_id,
                error = %e,
                "UPDATE of tags is not a string list, skipping"
            ),
        },
        key => {
            entity.attributes.insert(key.to_string(), new_value.clone());
        }
    }
}

fn apply_create(entities: &mut Vec<Entity>, change: &WorldChange) {
    let Some(value) = &change.value_new else {
        warn!(entity_id = %change.entity_id, "CREATE without entity body, skipping");
        return;
    };
    let entity: Entity = match serde_json::from_value(value.clone()) {
        Ok(entity) => entity,
        Err(e) => {
            warn!(entity_id = %change.entity_id, error = %e, "CREATE body is not an entity, skipping");
            return;
        }
    };
    if entities.iter().any(|e| e.id == entity.id) {
        warn!(entity_id = %entity.id, "CREATE of existing entity id, skipping");
        return;
    }
    entities.push(entity);
}
