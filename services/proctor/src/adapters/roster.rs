//! services/proctor/src/adapters/roster.rs
//!
//! An identity adapter backed by the fixture roster.

use async_trait::async_trait;
use exam_access_core::domain::Actor;
use exam_access_core::ports::{IdentityService, PortError, PortResult};
use std::collections::HashMap;

/// Implements the `IdentityService` port over a fixed list of actors.
#[derive(Debug, Clone, Default)]
pub struct RosterIdentity {
    actors: HashMap<String, Actor>,
}

impl RosterIdentity {
    pub fn new(actors: impl IntoIterator<Item = Actor>) -> Self {
        Self {
            actors: actors
                .into_iter()
                .map(|actor| (actor.actor_id.clone(), actor))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[async_trait]
impl IdentityService for RosterIdentity {
    async fn resolve_actor(&self, actor_id: &str) -> PortResult<Actor> {
        // Unknown ids are an authentication failure, not a missing resource.
        self.actors
            .get(actor_id.trim())
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_access_core::domain::Role;

    #[tokio::test]
    async fn resolves_known_actors_only() {
        let roster = RosterIdentity::new([Actor {
            actor_id: "t-1".to_string(),
            display_name: "Ms Rivera".to_string(),
            role: Role::Teacher,
            class_ref: None,
        }]);

        assert_eq!(roster.resolve_actor(" t-1 ").await.unwrap().role, Role::Teacher);
        assert_eq!(
            roster.resolve_actor("nobody").await,
            Err(PortError::Unauthorized)
        );
    }
}
