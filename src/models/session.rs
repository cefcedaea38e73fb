use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// The number of random bytes in a generated room ID.
const ROOM_ID_BYTES: usize = 16;

/// The lifecycle state of a live session.
///
/// Status only moves forward: there is no path back to `Scheduled`, and
/// `Ended` is terminal. `Ended` is never a legal target of a generic status
/// change; it is reached only through the dedicated force-end operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Active,
    Cancelled,
    Ended,
}

impl SessionStatus {
    /// Returns the lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Active => "active",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Ended => "ended",
        }
    }

    /// The legal-transition table for generic status changes.
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        matches!(
            (self, to),
            (SessionStatus::Scheduled, SessionStatus::Active)
                | (SessionStatus::Scheduled, SessionStatus::Cancelled)
                | (SessionStatus::Active, SessionStatus::Cancelled)
        )
    }

    /// Whether the force-end operation may run from this state.
    ///
    /// Ending is allowed from any state except `Cancelled`; an already-ended
    /// session is reported separately so callers see `SessionAlreadyEnded`.
    pub fn can_end(self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::Active)
    }

    /// Whether a session in this state may still grant room access.
    pub fn grants_access(self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a requested generic status change against the transition table.
///
/// An ended session rejects everything with `SessionAlreadyEnded`; any other
/// pair outside the table is an `InvalidTransition`.
pub fn check_transition(
    from: SessionStatus,
    to: SessionStatus,
) -> crate::error::Result<()> {
    if from == SessionStatus::Ended {
        return Err(crate::error::AppError::SessionAlreadyEnded);
    }

    if !from.can_transition_to(to) {
        return Err(crate::error::AppError::InvalidTransition { from, to });
    }

    Ok(())
}

/// Validates that the force-end operation may run from `from`.
///
/// An ended session reports `SessionAlreadyEnded`; a cancelled one reports
/// the end attempt as an `InvalidTransition`.
pub fn check_end(from: SessionStatus) -> crate::error::Result<()> {
    if from == SessionStatus::Ended {
        return Err(crate::error::AppError::SessionAlreadyEnded);
    }

    if !from.can_end() {
        return Err(crate::error::AppError::InvalidTransition {
            from,
            to: SessionStatus::Ended,
        });
    }

    Ok(())
}

/// Represents a scheduled or live teaching unit binding one trainer to a set
/// of students via their bookings.
///
/// `room_id` and `trainer_id` are immutable for the life of the entity, and
/// `student_ids` is exactly the deduplicated union of the attached bookings'
/// students. None of them are reachable through the generic patch path.
#[derive(FromRow, Clone, Debug, Serialize)]
pub struct LiveSession {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The ID of the owning trainer.
    pub trainer_id: Uuid,
    /// The enrolled students, sorted and deduplicated.
    pub student_ids: Vec<Uuid>,
    /// The bookings aggregated into this session.
    pub booking_ids: Vec<Uuid>,
    /// The opaque media-room identifier. Generated once, never reused.
    pub room_id: String,
    /// The lifecycle state of the session.
    pub status: SessionStatus,
    /// An optional human-readable title.
    pub title: Option<String>,
    /// The scheduled start of the session.
    pub scheduled_date: DateTime<Utc>,
    /// The planned duration in minutes.
    pub duration_minutes: i32,
    /// The maximum number of students.
    pub max_students: i32,
    /// The teaching language.
    pub language: Option<String>,
    /// The difficulty level.
    pub level: Option<String>,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session was last updated.
    pub updated_at: DateTime<Utc>,
}

impl LiveSession {
    /// Whether `user_id` is enrolled in this session.
    pub fn is_enrolled(&self, user_id: Uuid) -> bool {
        self.student_ids.binary_search(&user_id).is_ok()
    }

    /// Whether `user_id` is the owning trainer.
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.trainer_id == user_id
    }
}

/// Generates a fresh namespaced random room ID.
///
/// Random rather than counter-derived so room IDs cannot be guessed.
pub fn generate_room_id() -> String {
    let mut bytes = [0u8; ROOM_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("room_{}", general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Collapses the students of a set of bookings into a sorted, deduplicated set.
pub fn derive_student_set(students: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    students.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// The fields a trainer or admin may edit while a session has not ended.
///
/// `room_id`, `trainer_id`, membership, and `status` are not represented
/// here at all; unknown fields are rejected rather than ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub max_students: Option<i32>,
    pub language: Option<String>,
    pub level: Option<String>,
}

impl SessionPatch {
    /// Whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.scheduled_date.is_none()
            && self.duration_minutes.is_none()
            && self.max_students.is_none()
            && self.language.is_none()
            && self.level.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    const ALL: [SessionStatus; 4] = [
        SessionStatus::Scheduled,
        SessionStatus::Active,
        SessionStatus::Cancelled,
        SessionStatus::Ended,
    ];

    #[test]
    fn transition_table_is_exactly_three_pairs() {
        let legal = [
            (SessionStatus::Scheduled, SessionStatus::Active),
            (SessionStatus::Scheduled, SessionStatus::Cancelled),
            (SessionStatus::Active, SessionStatus::Cancelled),
        ];

        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "table mismatch for {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn ended_is_never_a_generic_target() {
        for from in ALL {
            assert!(!from.can_transition_to(SessionStatus::Ended));
        }
    }

    #[test]
    fn ended_session_rejects_every_request_as_already_ended() {
        for to in ALL {
            match check_transition(SessionStatus::Ended, to) {
                Err(AppError::SessionAlreadyEnded) => {}
                other => panic!("expected SessionAlreadyEnded, got {:?}", other),
            }
        }
    }

    #[test]
    fn illegal_pair_is_invalid_transition() {
        match check_transition(SessionStatus::Active, SessionStatus::Scheduled) {
            Err(AppError::InvalidTransition { from, to }) => {
                assert_eq!(from, SessionStatus::Active);
                assert_eq!(to, SessionStatus::Scheduled);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn legal_pairs_pass_validation() {
        assert!(check_transition(SessionStatus::Scheduled, SessionStatus::Active).is_ok());
        assert!(check_transition(SessionStatus::Scheduled, SessionStatus::Cancelled).is_ok());
        assert!(check_transition(SessionStatus::Active, SessionStatus::Cancelled).is_ok());
    }

    #[test]
    fn force_end_allowed_from_scheduled_and_active_only() {
        assert!(SessionStatus::Scheduled.can_end());
        assert!(SessionStatus::Active.can_end());
        assert!(!SessionStatus::Cancelled.can_end());
        assert!(!SessionStatus::Ended.can_end());
    }

    #[test]
    fn end_validation_mirrors_can_end() {
        assert!(check_end(SessionStatus::Scheduled).is_ok());
        assert!(check_end(SessionStatus::Active).is_ok());

        match check_end(SessionStatus::Ended) {
            Err(AppError::SessionAlreadyEnded) => {}
            other => panic!("expected SessionAlreadyEnded, got {:?}", other),
        }

        match check_end(SessionStatus::Cancelled) {
            Err(AppError::InvalidTransition { from, to }) => {
                assert_eq!(from, SessionStatus::Cancelled);
                assert_eq!(to, SessionStatus::Ended);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn only_scheduled_and_active_grant_access() {
        assert!(SessionStatus::Scheduled.grants_access());
        assert!(SessionStatus::Active.grants_access());
        assert!(!SessionStatus::Cancelled.grants_access());
        assert!(!SessionStatus::Ended.grants_access());
    }

    #[test]
    fn room_ids_are_namespaced_and_unique() {
        let a = generate_room_id();
        let b = generate_room_id();
        assert!(a.starts_with("room_"));
        assert!(b.starts_with("room_"));
        assert_ne!(a, b);
    }

    #[test]
    fn student_set_is_sorted_and_deduplicated() {
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let set = derive_student_set([y, x, y, x, y]);
        let mut expected = vec![x, y];
        expected.sort();
        assert_eq!(set, expected);
    }

    #[test]
    fn enrollment_check_uses_the_sorted_set() {
        let student = Uuid::new_v4();
        let session = LiveSession {
            id: Uuid::new_v4(),
            trainer_id: Uuid::new_v4(),
            student_ids: derive_student_set([student]),
            booking_ids: vec![Uuid::new_v4()],
            room_id: generate_room_id(),
            status: SessionStatus::Scheduled,
            title: None,
            scheduled_date: Utc::now(),
            duration_minutes: 60,
            max_students: 10,
            language: None,
            level: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(session.is_enrolled(student));
        assert!(!session.is_enrolled(Uuid::new_v4()));
    }
}
