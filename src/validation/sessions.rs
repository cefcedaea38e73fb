use crate::error::{AppError, Result};
use crate::models::session::SessionPatch;
use uuid::Uuid;

/// The most bookings one aggregation request may reference.
const MAX_BOOKINGS_PER_SESSION: usize = 100;

/// Validates the booking id list of an aggregation request.
///
/// # Arguments
///
/// * `booking_ids` - The booking IDs to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the list is acceptable.
pub fn validate_booking_ids(booking_ids: &[Uuid]) -> Result<()> {
    if booking_ids.is_empty() {
        return Err(AppError::Validation(
            "At least one booking id is required".to_string(),
        ));
    }

    if booking_ids.len() > MAX_BOOKINGS_PER_SESSION {
        return Err(AppError::Validation(format!(
            "At most {} bookings per session",
            MAX_BOOKINGS_PER_SESSION
        )));
    }

    Ok(())
}

/// Validates session schedule metadata.
///
/// # Arguments
///
/// * `duration_minutes` - The planned duration.
/// * `max_students` - The maximum number of students.
///
/// # Returns
///
/// A `Result<()>` indicating whether the metadata is acceptable.
pub fn validate_schedule(duration_minutes: i32, max_students: i32) -> Result<()> {
    if duration_minutes < 15 || duration_minutes > 480 {
        return Err(AppError::Validation(
            "Duration must be between 15 and 480 minutes".to_string(),
        ));
    }

    if max_students < 1 || max_students > 100 {
        return Err(AppError::Validation(
            "Max students must be between 1 and 100".to_string(),
        ));
    }

    Ok(())
}

/// Validates an optional session title.
///
/// # Arguments
///
/// * `title` - The title to validate, if present.
///
/// # Returns
///
/// A `Result<()>` indicating whether the title is acceptable.
pub fn validate_title(title: Option<&str>) -> Result<()> {
    if let Some(title) = title {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }

        if title.len() > 255 {
            return Err(AppError::Validation(
                "Title must be at most 255 characters".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates a field patch.
///
/// # Arguments
///
/// * `patch` - The patch to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the patch is acceptable.
pub fn validate_patch(patch: &SessionPatch) -> Result<()> {
    if patch.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }

    if let Some(duration) = patch.duration_minutes {
        if !(15..=480).contains(&duration) {
            return Err(AppError::Validation(
                "Duration must be between 15 and 480 minutes".to_string(),
            ));
        }
    }

    if let Some(max_students) = patch.max_students {
        if !(1..=100).contains(&max_students) {
            return Err(AppError::Validation(
                "Max students must be between 1 and 100".to_string(),
            ));
        }
    }

    validate_title(patch.title.as_deref())
}
