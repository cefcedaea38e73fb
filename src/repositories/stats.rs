use sqlx::PgPool;
use uuid::Uuid;
use crate::error::Result;

/// Increments a trainer's "sessions created" counter.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
/// * `trainer_id` - The trainer whose counter is incremented.
///
/// # Returns
///
/// A `Result<()>`.
pub async fn increment_sessions_created(pool: &PgPool, trainer_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET sessions_created = sessions_created + 1
        WHERE id = $1
        "#,
    )
    .bind(trainer_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Increments a trainer's "sessions completed" counter.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
/// * `trainer_id` - The trainer whose counter is incremented.
///
/// # Returns
///
/// A `Result<()>`.
pub async fn increment_sessions_completed(pool: &PgPool, trainer_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET sessions_completed = sessions_completed + 1
        WHERE id = $1
        "#,
    )
    .bind(trainer_id)
    .execute(pool)
    .await?;

    Ok(())
}
