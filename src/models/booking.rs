use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The payment state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Na,
}

/// The lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Represents a paid commitment between one student and one trainer.
///
/// `session_id` is set at most once, by the aggregator's conditional claim;
/// it is never cleared or reassigned from the booking side.
#[derive(FromRow, Clone, Debug, Serialize)]
pub struct Booking {
    /// The unique identifier for the booking.
    pub id: Uuid,
    /// The ID of the student who paid for the booking.
    pub student_id: Uuid,
    /// The ID of the trainer the booking is with.
    pub trainer_id: Uuid,
    /// The payment state of the booking.
    pub payment_status: PaymentStatus,
    /// The lifecycle state of the booking.
    pub status: BookingStatus,
    /// The amount paid, in cents.
    pub amount_cents: i64,
    /// The session this booking is attached to, if any.
    pub session_id: Option<Uuid>,
    /// The timestamp when the booking was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the booking was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Whether this booking can still be aggregated into a session owned by `trainer_id`.
    pub fn is_eligible_for(&self, trainer_id: Uuid) -> bool {
        self.trainer_id == trainer_id
            && self.payment_status == PaymentStatus::Completed
            && self.session_id.is_none()
    }
}
