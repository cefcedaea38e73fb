use sqlx::PgPool;
use uuid::Uuid;
use crate::error::Result;
use crate::models::booking::Booking;

/// Finds the requested bookings by ID.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
/// * `booking_ids` - The booking IDs the caller asked to aggregate.
///
/// # Returns
///
/// A `Result` containing the bookings that exist, in no particular order.
pub async fn find_by_ids(pool: &PgPool, booking_ids: &[Uuid]) -> Result<Vec<Booking>> {
    let bookings = sqlx::query_as::<_, Booking>(
        r#"
        SELECT id, student_id, trainer_id, payment_status, status,
               amount_cents, session_id, created_at, updated_at
        FROM bookings
        WHERE id = ANY($1)
        "#,
    )
    .bind(booking_ids)
    .fetch_all(pool)
    .await?;

    Ok(bookings)
}

/// Atomically claims a booking for a session.
///
/// The claim succeeds only while `session_id` is still null, so two
/// concurrent aggregations can never both attach the same booking.
///
/// # Arguments
///
/// * `executor` - A pool, connection, or open transaction.
/// * `booking_id` - The booking to claim.
/// * `trainer_id` - The trainer who must own the booking.
/// * `session_id` - The session claiming the booking.
///
/// # Returns
///
/// A `Result` containing `true` if this call won the claim.
pub async fn claim_for_session(
    executor: impl sqlx::PgExecutor<'_>,
    booking_id: Uuid,
    trainer_id: Uuid,
    session_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET session_id = $1, updated_at = NOW()
        WHERE id = $2
          AND trainer_id = $3
          AND payment_status = 'completed'
          AND session_id IS NULL
        "#,
    )
    .bind(session_id)
    .bind(booking_id)
    .bind(trainer_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Marks every booking attached to a session as completed.
///
/// # Arguments
///
/// * `executor` - A pool, connection, or open transaction.
/// * `session_id` - The session whose bookings are being completed.
///
/// # Returns
///
/// A `Result` containing the number of bookings flipped.
pub async fn complete_for_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET status = 'completed', updated_at = NOW()
        WHERE session_id = $1 AND status != 'completed'
        "#,
    )
    .bind(session_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
