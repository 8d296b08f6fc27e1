use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::domain::post::PhotoFile;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Replaces every character outside `[A-Za-z0-9.]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

pub fn storage_key(prefix: &str, epoch_ms: i128, file_name: &str) -> String {
    format!(
        "{}/{}_{}",
        prefix.trim_end_matches('/'),
        epoch_ms,
        sanitize_file_name(file_name)
    )
}

pub fn content_type(file: &PhotoFile) -> String {
    if let Some(content_type) = file.content_type.as_deref().filter(|ct| !ct.trim().is_empty()) {
        return content_type.to_string();
    }

    match image::guess_format(&file.bytes) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => FALLBACK_CONTENT_TYPE.to_string(),
    }
}

pub fn to_data_url(file: &PhotoFile) -> String {
    format!("data:{};base64,{}", content_type(file), STANDARD.encode(&file.bytes))
}
