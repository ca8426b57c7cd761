use super::WorldState;
use std::collections::HashSet;
use std::fmt;

/// Errors raised when building a WorldState
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Two entities share an id
    DuplicateEntityId(String),
    /// Document does not match the model (unknown kind or mode, missing field, bad JSON)
    InvalidDocument(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::DuplicateEntityId(id) => write!(f, "duplicate entity id '{}'", id),
            ModelError::InvalidDocument(msg) => write!(f, "invalid world document: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

/// Validates invariants of a world snapshot.
///
/// Entity kind and turn mode are closed enums and are already enforced by
/// deserialization; what remains is id uniqueness.
pub fn validate_world(state: &WorldState) -> Result<(), ModelError> {
    let mut seen = HashSet::with_capacity(state.entities.len());
    for entity in &state.entities {
        if !seen.insert(entity.id.as_str()) {
            return Err(ModelError::DuplicateEntityId(entity.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod validation_tests {
    use super::*;
    use crate::model::{Entity, EntityKind, Environment, TurnMode};
    use std::collections::BTreeMap;

    fn item(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            name: id.to_string(),
            kind: EntityKind::Item,
            tags: vec![],
            attributes: BTreeMap::new(),
            driver: None,
        }
    }

    fn state_with(entities: Vec<Entity>) -> WorldState {
        WorldState {
            room_id: "room".to_string(),
            turn_mode: TurnMode::Simultaneous,
            agent_timeout_seconds: 60,
            environment: Environment::default(),
            entities,
        }
    }

    #[test]
    fn test_unique_ids_pass() {
        assert!(validate_world(&state_with(vec![item("a"), item("b")])).is_ok());
        assert!(validate_world(&state_with(vec![])).is_ok());
    }

    #[test]
    fn test_duplicate_ids_fail() {
        let result = validate_world(&state_with(vec![item("a"), item("b"), item("a")]));
        assert_eq!(result, Err(ModelError::DuplicateEntityId("a".to_string())));
    }
}
