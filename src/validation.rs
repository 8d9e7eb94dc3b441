//! Request validation rules shared by the handlers.

use derive_more::Display;

pub const NAME_MAX_LEN: usize = 100;
pub const DEPARTMENT_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PIN_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ValidationError {
    #[display(fmt = "{} is required", field)]
    Empty { field: &'static str },

    #[display(fmt = "{} must be at most {} characters", field, max)]
    TooLong { field: &'static str, max: usize },

    #[display(fmt = "{} must be at least {} characters", field, min)]
    TooShort { field: &'static str, min: usize },

    #[display(fmt = "{}: {}", field, reason)]
    InvalidFormat {
        field: &'static str,
        reason: &'static str,
    },

    #[display(fmt = "No fields provided for update")]
    NothingToUpdate,
}

impl std::error::Error for ValidationError {}

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

/// Like [`required_text`] but an empty value means "no value".
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_text(field, v, max).map(Some),
    }
}

pub fn email(value: &str) -> Result<String, ValidationError> {
    let value = required_text("email", value, EMAIL_MAX_LEN)?.to_lowercase();

    let invalid = ValidationError::InvalidFormat {
        field: "email",
        reason: "must be a valid email address",
    };
    let (local, domain) = value.split_once('@').ok_or_else(|| invalid.clone())?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || value.chars().any(char::is_whitespace)
    {
        return Err(invalid);
    }
    Ok(value)
}

/// Login passwords are only checked for presence; new passwords also for length.
pub fn password(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field: "password" });
    }
    Ok(())
}

pub fn new_password(value: &str) -> Result<(), ValidationError> {
    password(value)?;
    if value.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "password",
            min: PASSWORD_MIN_LEN,
        });
    }
    Ok(())
}

pub fn pin(value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field: "pin" });
    }
    if value.len() != PIN_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "pin",
            reason: "must be exactly 4 digits",
        });
    }
    Ok(value.to_string())
}
