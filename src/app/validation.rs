use thiserror::Error;

use crate::domain::post::NewPost;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 80;
pub const MESSAGE_MIN_CHARS: usize = 2;
pub const MESSAGE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must be between {} and {} characters", NAME_MIN_CHARS, NAME_MAX_CHARS)]
    Name,
    #[error("message must be between {} and {} characters", MESSAGE_MIN_CHARS, MESSAGE_MAX_CHARS)]
    Message,
    #[error("a photo or a sticker is required")]
    MissingPhoto,
}

/// Checks a submission the way the post form does and returns it trimmed.
///
/// Length bounds apply to the text as typed; surrounding whitespace is only
/// dropped afterwards. A value that is blank once trimmed is rejected.
pub fn validate_submission(input: &NewPost, has_photo: bool) -> Result<NewPost, ValidationError> {
    if !acceptable(&input.name, NAME_MIN_CHARS, NAME_MAX_CHARS) {
        return Err(ValidationError::Name);
    }
    if !acceptable(&input.message, MESSAGE_MIN_CHARS, MESSAGE_MAX_CHARS) {
        return Err(ValidationError::Message);
    }
    if !has_photo {
        return Err(ValidationError::MissingPhoto);
    }

    Ok(NewPost::new(input.name.trim(), input.message.trim()))
}

fn acceptable(value: &str, min: usize, max: usize) -> bool {
    let count = value.chars().count();
    count >= min && count <= max && !value.trim().is_empty()
}
