use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::auth::{AuthContext, Role},
    models::booking::Booking,
    models::session::{self, LiveSession, SessionPatch, SessionStatus},
    repositories::booking as booking_repo,
    repositories::session as session_repo,
    repositories::stats as stats_repo,
    state::AppState,
};

/// The aggregation input: booking ids plus schedule metadata.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub booking_ids: Vec<Uuid>,
    pub title: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_students: i32,
    pub language: Option<String>,
    pub level: Option<String>,
}

/// Checks that the caller may mutate this session: owning trainer or admin.
pub fn authorize_mutation(auth: &AuthContext, session: &LiveSession) -> Result<()> {
    if auth.role == Role::Admin || session.is_owned_by(auth.user_id) {
        return Ok(());
    }

    Err(AppError::AccessDenied)
}

/// Selects the subset of fetched bookings that can be aggregated.
///
/// Sorted by booking id so concurrent aggregations over overlapping sets
/// acquire their row locks in the same order instead of deadlocking.
fn eligible_subset(bookings: Vec<Booking>, trainer_id: Uuid) -> Vec<Booking> {
    let mut eligible: Vec<Booking> = bookings
        .into_iter()
        .filter(|b| b.is_eligible_for(trainer_id))
        .collect();

    eligible.sort_by_key(|b| b.id);
    eligible
}

/// Aggregates eligible bookings into a new session.
///
/// Ineligible ids (unpaid, foreign, already claimed) are silently dropped;
/// only an empty result is an error. The claim step runs inside one
/// transaction so a partially aggregated session is never visible, and each
/// booking is claimed with a conditional update so a concurrent aggregation
/// can never attach it twice. Losing every claim means our read was stale;
/// eligibility is recomputed and the whole attempt retried once.
pub async fn create_session(
    state: &AppState,
    auth: &AuthContext,
    request: CreateSessionRequest,
) -> Result<LiveSession> {
    for attempt in 0..2 {
        let fetched = booking_repo::find_by_ids(&state.db, &request.booking_ids).await?;
        let eligible = eligible_subset(fetched, auth.user_id);

        if eligible.is_empty() {
            return Err(AppError::NoEligibleBookings);
        }

        if let Some(created) = try_aggregate(state, auth.user_id, &request, &eligible).await? {
            tracing::info!(
                "✅ Session {} created from {} booking(s), room {}",
                created.id,
                created.booking_ids.len(),
                created.room_id
            );

            let db = state.db.clone();
            let trainer_id = auth.user_id;
            tokio::spawn(async move {
                if let Err(e) = stats_repo::increment_sessions_created(&db, trainer_id).await {
                    tracing::warn!(
                        "⚠️ Failed to increment sessions_created for {}: {}",
                        trainer_id,
                        e
                    );
                }
            });

            return Ok(created);
        }

        if attempt == 0 {
            tracing::warn!("⚠️ Aggregation lost every booking claim, recomputing eligibility");
        }
    }

    Err(AppError::NoEligibleBookings)
}

/// One transactional aggregation attempt.
///
/// Returns `Ok(None)` when every conditional claim lost, which rolls the
/// transaction back so nothing of the attempt remains visible.
async fn try_aggregate(
    state: &AppState,
    trainer_id: Uuid,
    request: &CreateSessionRequest,
    eligible: &[Booking],
) -> Result<Option<LiveSession>> {
    let session_id = Uuid::new_v4();
    let room_id = session::generate_room_id();

    let mut tx = state.db.begin().await?;

    let new_session = session_repo::NewSession {
        id: session_id,
        trainer_id,
        student_ids: session::derive_student_set(eligible.iter().map(|b| b.student_id)),
        booking_ids: eligible.iter().map(|b| b.id).collect(),
        room_id,
        title: request.title.clone(),
        scheduled_date: request.scheduled_date,
        duration_minutes: request.duration_minutes,
        max_students: request.max_students,
        language: request.language.clone(),
        level: request.level.clone(),
    };

    let session = session_repo::insert(&mut *tx, &new_session).await?;

    let mut claimed: Vec<&Booking> = Vec::with_capacity(eligible.len());
    for booking in eligible {
        if booking_repo::claim_for_session(&mut *tx, booking.id, trainer_id, session_id).await? {
            claimed.push(booking);
        } else {
            tracing::debug!("Booking {} lost the claim race, excluded", booking.id);
        }
    }

    if claimed.is_empty() {
        tx.rollback().await?;
        return Ok(None);
    }

    let session = if claimed.len() == eligible.len() {
        session
    } else {
        // Some bookings were grabbed by a concurrent aggregation; the final
        // membership is exactly the claims we won.
        let student_ids = session::derive_student_set(claimed.iter().map(|b| b.student_id));
        let booking_ids: Vec<Uuid> = claimed.iter().map(|b| b.id).collect();
        session_repo::update_members(&mut *tx, session_id, &student_ids, &booking_ids).await?
    };

    tx.commit().await?;
    Ok(Some(session))
}

/// Applies a generic status change for the owning trainer or an admin.
///
/// The update is conditional on the status the caller's view was based on;
/// a lost race is re-read and surfaced as `SessionAlreadyEnded` or
/// `InvalidTransition`, never silently overwritten.
pub async fn change_status(
    state: &AppState,
    auth: &AuthContext,
    session_id: Uuid,
    to: SessionStatus,
) -> Result<LiveSession> {
    let current = session_repo::find_by_id(&state.db, session_id)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    authorize_mutation(auth, &current)?;
    session::check_transition(current.status, to)?;

    match session_repo::update_status_if(&state.db, session_id, current.status, to).await? {
        Some(updated) => {
            tracing::info!(
                "✅ Session {} moved from {} to {}",
                session_id,
                current.status,
                updated.status
            );
            Ok(updated)
        }
        None => {
            // The caller's view was stale. Report against the fresh state.
            let fresh = session_repo::find_by_id(&state.db, session_id)
                .await?
                .ok_or(AppError::SessionNotFound)?;

            if fresh.status == SessionStatus::Ended {
                Err(AppError::SessionAlreadyEnded)
            } else {
                Err(AppError::InvalidTransition {
                    from: fresh.status,
                    to,
                })
            }
        }
    }
}

/// Force-ends a session and cascades booking completion.
///
/// Allowed for the owning trainer or an admin, from any state except
/// `cancelled`. Once ended the session is permanently read-only.
pub async fn end_session(
    state: &AppState,
    auth: &AuthContext,
    session_id: Uuid,
) -> Result<LiveSession> {
    let current = session_repo::find_by_id(&state.db, session_id)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    authorize_mutation(auth, &current)?;
    session::check_end(current.status)?;

    let mut tx = state.db.begin().await?;

    match session_repo::mark_ended(&mut *tx, session_id).await? {
        Some(ended) => {
            let completed = booking_repo::complete_for_session(&mut *tx, session_id).await?;
            tx.commit().await?;

            tracing::info!(
                "✅ Session {} ended, {} booking(s) completed",
                session_id,
                completed
            );

            let db = state.db.clone();
            let trainer_id = ended.trainer_id;
            tokio::spawn(async move {
                if let Err(e) = stats_repo::increment_sessions_completed(&db, trainer_id).await {
                    tracing::warn!(
                        "⚠️ Failed to increment sessions_completed for {}: {}",
                        trainer_id,
                        e
                    );
                }
            });

            Ok(ended)
        }
        None => {
            tx.rollback().await?;

            let fresh = session_repo::find_by_id(&state.db, session_id)
                .await?
                .ok_or(AppError::SessionNotFound)?;

            // Status never moves back to an endable state, so the fresh
            // read always explains the rejection.
            session::check_end(fresh.status)?;
            Err(AppError::SessionAlreadyEnded)
        }
    }
}

/// Applies a bounded field patch for the owning trainer or an admin.
pub async fn patch_session(
    state: &AppState,
    auth: &AuthContext,
    session_id: Uuid,
    patch: SessionPatch,
) -> Result<LiveSession> {
    let current = session_repo::find_by_id(&state.db, session_id)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    authorize_mutation(auth, &current)?;

    if current.status == SessionStatus::Ended {
        return Err(AppError::SessionAlreadyEnded);
    }

    match session_repo::apply_patch(&state.db, session_id, &patch).await? {
        Some(updated) => Ok(updated),
        // The session ended between our read and the conditional update.
        None => Err(AppError::SessionAlreadyEnded),
    }
}

/// Fetches a session for a caller allowed to see it: owner, admin, or
/// enrolled student.
pub async fn get_session(
    state: &AppState,
    auth: &AuthContext,
    session_id: Uuid,
) -> Result<LiveSession> {
    let session = session_repo::find_by_id(&state.db, session_id)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    if auth.role == Role::Admin
        || session.is_owned_by(auth.user_id)
        || session.is_enrolled(auth.user_id)
    {
        return Ok(session);
    }

    Err(AppError::AccessDenied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{BookingStatus, PaymentStatus};
    use crate::models::session::{derive_student_set, generate_room_id};

    fn auth(user_id: Uuid, role: Role) -> AuthContext {
        AuthContext {
            user_id,
            role,
            display_name: "Test User".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn owned_session(trainer_id: Uuid) -> LiveSession {
        LiveSession {
            id: Uuid::new_v4(),
            trainer_id,
            student_ids: derive_student_set([]),
            booking_ids: vec![],
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
        }
    }

    fn booking(trainer_id: Uuid, student_id: Uuid, payment_status: PaymentStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            student_id,
            trainer_id,
            payment_status,
            status: BookingStatus::Confirmed,
            amount_cents: 2500,
            session_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_may_mutate() {
        let trainer = Uuid::new_v4();
        let session = owned_session(trainer);
        assert!(authorize_mutation(&auth(trainer, Role::Trainer), &session).is_ok());
    }

    #[test]
    fn admin_may_mutate_any_session() {
        let session = owned_session(Uuid::new_v4());
        assert!(authorize_mutation(&auth(Uuid::new_v4(), Role::Admin), &session).is_ok());
    }

    #[test]
    fn other_trainer_may_not_mutate() {
        let session = owned_session(Uuid::new_v4());
        let result = authorize_mutation(&auth(Uuid::new_v4(), Role::Trainer), &session);
        assert!(matches!(result, Err(AppError::AccessDenied)));
    }

    #[test]
    fn student_may_not_mutate() {
        let session = owned_session(Uuid::new_v4());
        let result = authorize_mutation(&auth(Uuid::new_v4(), Role::Student), &session);
        assert!(matches!(result, Err(AppError::AccessDenied)));
    }

    #[test]
    fn eligible_subset_drops_unpaid_and_foreign_bookings() {
        let trainer = Uuid::new_v4();
        let paid = booking(trainer, Uuid::new_v4(), PaymentStatus::Completed);
        let pending = booking(trainer, Uuid::new_v4(), PaymentStatus::Pending);
        let foreign = booking(Uuid::new_v4(), Uuid::new_v4(), PaymentStatus::Completed);

        let subset = eligible_subset(vec![paid.clone(), pending, foreign], trainer);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].id, paid.id);
    }

    #[test]
    fn eligible_subset_drops_already_claimed_bookings() {
        let trainer = Uuid::new_v4();
        let mut claimed = booking(trainer, Uuid::new_v4(), PaymentStatus::Completed);
        claimed.session_id = Some(Uuid::new_v4());

        let subset = eligible_subset(vec![claimed], trainer);
        assert!(subset.is_empty());
    }

    #[test]
    fn eligible_subset_claims_in_ascending_booking_id_order() {
        let trainer = Uuid::new_v4();
        let bookings: Vec<Booking> = (0..8)
            .map(|_| booking(trainer, Uuid::new_v4(), PaymentStatus::Completed))
            .collect();

        let subset = eligible_subset(bookings.clone(), trainer);

        let mut expected: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();
        expected.sort();
        let got: Vec<Uuid> = subset.iter().map(|b| b.id).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn duplicate_students_collapse_into_one_seat() {
        let trainer = Uuid::new_v4();
        let student = Uuid::new_v4();
        let a = booking(trainer, student, PaymentStatus::Completed);
        let b = booking(trainer, student, PaymentStatus::Completed);

        let subset = eligible_subset(vec![a, b], trainer);
        let students = derive_student_set(subset.iter().map(|b| b.student_id));
        assert_eq!(subset.len(), 2);
        assert_eq!(students, vec![student]);
    }
}
