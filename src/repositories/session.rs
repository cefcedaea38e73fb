use sqlx::PgPool;
use uuid::Uuid;
use crate::error::Result;
use crate::models::session::{LiveSession, SessionPatch, SessionStatus};

/// The insertable shape of a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub student_ids: Vec<Uuid>,
    pub booking_ids: Vec<Uuid>,
    pub room_id: String,
    pub title: Option<String>,
    pub scheduled_date: chrono::DateTime<chrono::Utc>,
    pub duration_minutes: i32,
    pub max_students: i32,
    pub language: Option<String>,
    pub level: Option<String>,
}

/// Inserts a new session with `status = scheduled`.
///
/// # Arguments
///
/// * `executor` - A pool, connection, or open transaction.
/// * `new_session` - The session to insert.
///
/// # Returns
///
/// A `Result` containing the created `LiveSession`.
pub async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    new_session: &NewSession,
) -> Result<LiveSession> {
    let session = sqlx::query_as::<_, LiveSession>(
        r#"
        INSERT INTO sessions (
            id, trainer_id, student_ids, booking_ids, room_id, status,
            title, scheduled_date, duration_minutes, max_students, language, level
        )
        VALUES ($1, $2, $3, $4, $5, 'scheduled', $6, $7, $8, $9, $10, $11)
        RETURNING id, trainer_id, student_ids, booking_ids, room_id, status,
                  title, scheduled_date, duration_minutes, max_students,
                  language, level, created_at, updated_at
        "#,
    )
    .bind(new_session.id)
    .bind(new_session.trainer_id)
    .bind(&new_session.student_ids)
    .bind(&new_session.booking_ids)
    .bind(&new_session.room_id)
    .bind(&new_session.title)
    .bind(new_session.scheduled_date)
    .bind(new_session.duration_minutes)
    .bind(new_session.max_students)
    .bind(&new_session.language)
    .bind(&new_session.level)
    .fetch_one(executor)
    .await?;

    Ok(session)
}

/// Finds a session by its ID.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
/// * `session_id` - The ID of the session to find.
///
/// # Returns
///
/// A `Result` containing an `Option<LiveSession>`.
pub async fn find_by_id(pool: &PgPool, session_id: Uuid) -> Result<Option<LiveSession>> {
    let session = sqlx::query_as::<_, LiveSession>(
        r#"
        SELECT id, trainer_id, student_ids, booking_ids, room_id, status,
               title, scheduled_date, duration_minutes, max_students,
               language, level, created_at, updated_at
        FROM sessions
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// Replaces a session's membership after the claim step settled.
///
/// Only the aggregator calls this, inside its transaction, to drop bookings
/// that lost the claim race.
pub async fn update_members(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: Uuid,
    student_ids: &[Uuid],
    booking_ids: &[Uuid],
) -> Result<LiveSession> {
    let session = sqlx::query_as::<_, LiveSession>(
        r#"
        UPDATE sessions
        SET student_ids = $2, booking_ids = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING id, trainer_id, student_ids, booking_ids, room_id, status,
                  title, scheduled_date, duration_minutes, max_students,
                  language, level, created_at, updated_at
        "#,
    )
    .bind(session_id)
    .bind(student_ids)
    .bind(booking_ids)
    .fetch_one(executor)
    .await?;

    Ok(session)
}

/// Applies a status change only if the stored status still matches `from`.
///
/// Two concurrent transition requests can never both succeed: the loser sees
/// zero rows updated and gets `None` back.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
/// * `session_id` - The session to update.
/// * `from` - The status the caller observed.
/// * `to` - The requested status.
///
/// # Returns
///
/// A `Result` containing the updated session, or `None` if the conditional
/// update lost the race.
pub async fn update_status_if(
    pool: &PgPool,
    session_id: Uuid,
    from: SessionStatus,
    to: SessionStatus,
) -> Result<Option<LiveSession>> {
    let session = sqlx::query_as::<_, LiveSession>(
        r#"
        UPDATE sessions
        SET status = $3, updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING id, trainer_id, student_ids, booking_ids, room_id, status,
                  title, scheduled_date, duration_minutes, max_students,
                  language, level, created_at, updated_at
        "#,
    )
    .bind(session_id)
    .bind(from)
    .bind(to)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// Moves a session to `ended`, from any state except `cancelled` or `ended`.
///
/// # Arguments
///
/// * `executor` - A pool, connection, or open transaction.
/// * `session_id` - The session to end.
///
/// # Returns
///
/// A `Result` containing the ended session, or `None` if the session was
/// already cancelled, already ended, or missing.
pub async fn mark_ended(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: Uuid,
) -> Result<Option<LiveSession>> {
    let session = sqlx::query_as::<_, LiveSession>(
        r#"
        UPDATE sessions
        SET status = 'ended', updated_at = NOW()
        WHERE id = $1 AND status IN ('scheduled', 'active')
        RETURNING id, trainer_id, student_ids, booking_ids, room_id, status,
                  title, scheduled_date, duration_minutes, max_students,
                  language, level, created_at, updated_at
        "#,
    )
    .bind(session_id)
    .fetch_optional(executor)
    .await?;

    Ok(session)
}

/// Applies a bounded field patch while the session has not ended.
///
/// `room_id`, `trainer_id`, membership, and `status` are deliberately not
/// reachable from here.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
/// * `session_id` - The session to patch.
/// * `patch` - The fields to change; `None` fields keep their value.
///
/// # Returns
///
/// A `Result` containing the patched session, or `None` if the session is
/// already ended or missing.
pub async fn apply_patch(
    pool: &PgPool,
    session_id: Uuid,
    patch: &SessionPatch,
) -> Result<Option<LiveSession>> {
    let session = sqlx::query_as::<_, LiveSession>(
        r#"
        UPDATE sessions
        SET title = COALESCE($2, title),
            scheduled_date = COALESCE($3, scheduled_date),
            duration_minutes = COALESCE($4, duration_minutes),
            max_students = COALESCE($5, max_students),
            language = COALESCE($6, language),
            level = COALESCE($7, level),
            updated_at = NOW()
        WHERE id = $1 AND status != 'ended'
        RETURNING id, trainer_id, student_ids, booking_ids, room_id, status,
                  title, scheduled_date, duration_minutes, max_students,
                  language, level, created_at, updated_at
        "#,
    )
    .bind(session_id)
    .bind(&patch.title)
    .bind(patch.scheduled_date)
    .bind(patch.duration_minutes)
    .bind(patch.max_students)
    .bind(&patch.language)
    .bind(&patch.level)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}
