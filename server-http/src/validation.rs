use dismissible::domain::validate_identity;

/// Upper bound on ids accepted by one batch request.
pub const MAX_BATCH_ITEMS: usize = 100;

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    InvalidIdentity { field: &'static str, reason: String },
    TooManyItems { max: usize, actual: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidIdentity { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            ValidationError::TooManyItems { max, actual } => {
                write!(f, "Too many itemIds: {} given, at most {} allowed", actual, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

fn check(field: &'static str, value: &str) -> Result<(), ValidationError> {
    validate_identity(field, value).map_err(|e| ValidationError::InvalidIdentity {
        field,
        reason: e.to_string(),
    })
}

/// Path parameters of the single-item routes.
pub fn validate_item_path(user_id: &str, item_id: &str) -> Result<(), ValidationError> {
    check("userId", user_id)?;
    check("itemId", item_id)
}

/// A batch is rejected as a whole if it is oversized or any id is malformed.
pub fn validate_batch(user_id: &str, item_ids: &[String]) -> Result<(), ValidationError> {
    check("userId", user_id)?;
    if item_ids.len() > MAX_BATCH_ITEMS {
        return Err(ValidationError::TooManyItems {
            max: MAX_BATCH_ITEMS,
            actual: item_ids.len(),
        });
    }
    for item_id in item_ids {
        check("itemId", item_id)?;
    }
    Ok(())
}
