use serde::Serialize;
use uuid::Uuid;

use crate::{
    crypto::room_token::{self, RoomTokenPayload},
    error::{AppError, Result},
    models::auth::{AuthContext, Role},
    models::session::LiveSession,
    repositories::session as session_repo,
    services::privileges,
    state::AppState,
};

/// The access decision for one (requester, session) pair.
///
/// Computed fresh on every join request and never persisted; the issued
/// token's embedded expiry is the only lifetime it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// The media room to join.
    pub room_id: String,
    /// The requester's room-scoped identity.
    pub subject_id: String,
    /// Always true once authorized.
    pub can_login: bool,
    /// Whether the requester may publish media.
    pub can_publish: bool,
    /// How long the issued token stays valid.
    pub ttl_seconds: u32,
}

/// The response handed to the media client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAccess {
    pub room_id: String,
    pub subject_id: String,
    pub token: String,
    pub role: Role,
    pub display_name: String,
}

/// Derives the room-scoped subject identity for a requester.
///
/// Stable and collision-free (the user ID is unique), and readable in logs.
pub fn subject_id_for(role: Role, user_id: Uuid) -> String {
    format!("{}:{}", role, user_id)
}

/// Computes the access grant for a requester against a session.
///
/// Pure; fails with `AccessDenied` before any token work when the resolver
/// does not grant a join right.
pub fn grant_for(auth: &AuthContext, session: &LiveSession, ttl_seconds: u32) -> Result<AccessGrant> {
    let privilege = privileges::resolve(auth.user_id, auth.role, session);

    if !privilege.can_join {
        return Err(AppError::AccessDenied);
    }

    Ok(AccessGrant {
        room_id: session.room_id.clone(),
        subject_id: subject_id_for(auth.role, auth.user_id),
        can_login: true,
        can_publish: privilege.can_publish,
        ttl_seconds,
    })
}

/// Authorizes a join request and issues a room token for it.
///
/// Sequence: session lookup, privilege resolution, subject derivation, token
/// issuance. The display name and role ride along so the media client can
/// render a participant list without a second round trip.
pub async fn request_access(
    state: &AppState,
    auth: &AuthContext,
    session_id: Uuid,
) -> Result<RoomAccess> {
    let session = session_repo::find_by_id(&state.db, session_id)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    let grant = grant_for(auth, &session, state.config.token_ttl_seconds)?;

    let payload = RoomTokenPayload::new(grant.room_id.as_str(), grant.can_login, grant.can_publish);
    let token = room_token::issue(
        &state.config.token_app_id,
        &grant.subject_id,
        &state.config.token_secret,
        grant.ttl_seconds,
        &payload,
    )?;

    tracing::info!(
        "✅ Access token issued for {} on room {} (publish: {})",
        grant.subject_id,
        grant.room_id,
        grant.can_publish
    );

    Ok(RoomAccess {
        room_id: grant.room_id,
        subject_id: grant.subject_id,
        token,
        role: auth.role,
        display_name: auth.display_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{SessionStatus, derive_student_set, generate_room_id};
    use chrono::Utc;

    fn auth(user_id: Uuid, role: Role) -> AuthContext {
        AuthContext {
            user_id,
            role,
            display_name: "Test User".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn session(trainer_id: Uuid, students: Vec<Uuid>, status: SessionStatus) -> LiveSession {
        LiveSession {
            id: Uuid::new_v4(),
            trainer_id,
            student_ids: derive_student_set(students),
            booking_ids: vec![Uuid::new_v4()],
            room_id: generate_room_id(),
            status,
            title: None,
            scheduled_date: Utc::now(),
            duration_minutes: 60,
            max_students: 10,
            language: None,
            level: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn subject_ids_are_stable_and_readable() {
        let id = Uuid::new_v4();
        let a = subject_id_for(Role::Student, id);
        let b = subject_id_for(Role::Student, id);
        assert_eq!(a, b);
        assert_eq!(a, format!("student:{}", id));
    }

    #[test]
    fn subject_ids_differ_per_user() {
        assert_ne!(
            subject_id_for(Role::Student, Uuid::new_v4()),
            subject_id_for(Role::Student, Uuid::new_v4())
        );
    }

    #[test]
    fn enrolled_student_gets_subscribe_only_grant() {
        let student = Uuid::new_v4();
        let s = session(Uuid::new_v4(), vec![student], SessionStatus::Scheduled);

        let grant = grant_for(&auth(student, Role::Student), &s, 600).unwrap();
        assert!(grant.can_login);
        assert!(!grant.can_publish);
        assert_eq!(grant.room_id, s.room_id);
        assert_eq!(grant.ttl_seconds, 600);
    }

    #[test]
    fn owning_trainer_gets_publish_grant_on_active_session() {
        let trainer = Uuid::new_v4();
        let s = session(trainer, vec![], SessionStatus::Active);

        let grant = grant_for(&auth(trainer, Role::Trainer), &s, 600).unwrap();
        assert!(grant.can_login);
        assert!(grant.can_publish);
    }

    #[test]
    fn cancelled_session_denies_everyone() {
        let trainer = Uuid::new_v4();
        let student = Uuid::new_v4();
        let s = session(trainer, vec![student], SessionStatus::Cancelled);

        for (id, role) in [
            (trainer, Role::Trainer),
            (student, Role::Student),
            (Uuid::new_v4(), Role::Admin),
        ] {
            let result = grant_for(&auth(id, role), &s, 600);
            assert!(matches!(result, Err(AppError::AccessDenied)));
        }
    }

    #[test]
    fn stranger_is_denied_before_token_issuance() {
        let s = session(Uuid::new_v4(), vec![Uuid::new_v4()], SessionStatus::Active);
        let result = grant_for(&auth(Uuid::new_v4(), Role::Student), &s, 600);
        assert!(matches!(result, Err(AppError::AccessDenied)));
    }
}
