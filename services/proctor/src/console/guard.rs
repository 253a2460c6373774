//! services/proctor/src/console/guard.rs
//!
//! Role and class checks applied before a console command reaches the core.

use exam_access_core::domain::{AccessToken, Actor, Role};
use tracing::warn;

use crate::console::state::{ActiveExam, ConsoleSession};
use crate::error::{ServiceError, ServiceResult};

pub fn require_actor(session: &ConsoleSession) -> ServiceResult<&Actor> {
    session.actor.as_ref().ok_or(ServiceError::NotLoggedIn)
}

/// Only lets `role` through.
pub fn require_role(session: &ConsoleSession, role: Role) -> ServiceResult<&Actor> {
    let actor = require_actor(session)?;
    if actor.role != role {
        warn!(
            "{} {} attempted a {}-only command",
            actor.role.as_str(),
            actor.actor_id,
            role.as_str()
        );
        return Err(ServiceError::Forbidden(format!(
            "only a {} may do this",
            role.as_str()
        )));
    }
    Ok(actor)
}

/// A token bound to a class only admits students of that class. Students with
/// no class are refused.
pub fn require_class(actor: &Actor, token: &AccessToken) -> ServiceResult<()> {
    match (&token.class_ref, &actor.class_ref) {
        (None, _) => Ok(()),
        (Some(expected), Some(actual)) if expected == actual => Ok(()),
        (Some(expected), Some(actual)) => {
            warn!(
                "Student {} of class {} presented a code for class {}",
                actor.actor_id, actual, expected
            );
            Err(ServiceError::Forbidden(
                "this exam code is for another class".to_string(),
            ))
        }
        (Some(expected), None) => {
            warn!(
                "Student {} has no class but presented a code for class {}",
                actor.actor_id, expected
            );
            Err(ServiceError::Forbidden(
                "this exam code is for a class you are not enrolled in".to_string(),
            ))
        }
    }
}

pub fn require_exam(session: &ConsoleSession) -> ServiceResult<&ActiveExam> {
    session.exam.as_ref().ok_or(ServiceError::NoExam)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn actor(role: Role, class_ref: Option<&str>) -> Actor {
        Actor {
            actor_id: "a-1".to_string(),
            display_name: "A".to_string(),
            role,
            class_ref: class_ref.map(str::to_string),
        }
    }

    fn token(class_ref: Option<&str>) -> AccessToken {
        let now = Utc::now();
        AccessToken {
            id: Uuid::new_v4(),
            exam_ref: "math-1".to_string(),
            class_ref: class_ref.map(str::to_string),
            subject_ref: None,
            value: "ABC234".to_string(),
            issued_at: now,
            expires_at: now,
            rotation: None,
            active: true,
            rotations: 0,
            duration_seconds: None,
        }
    }

    #[test]
    fn role_checks() {
        let mut session = ConsoleSession::default();
        assert!(matches!(
            require_role(&session, Role::Teacher),
            Err(ServiceError::NotLoggedIn)
        ));

        session.actor = Some(actor(Role::Student, None));
        assert!(matches!(
            require_role(&session, Role::Teacher),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(require_role(&session, Role::Student).is_ok());
        assert!(matches!(require_exam(&session), Err(ServiceError::NoExam)));
    }

    #[test]
    fn class_bound_tokens_admit_only_their_class() {
        let student = actor(Role::Student, Some("9B"));
        let unplaced = actor(Role::Student, None);
        assert!(require_class(&student, &token(Some("9B"))).is_ok());
        assert!(require_class(&student, &token(None)).is_ok());
        assert!(require_class(&unplaced, &token(None)).is_ok());
        assert!(matches!(
            require_class(&unplaced, &token(Some("9B"))),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            require_class(&student, &token(Some("9C"))),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
