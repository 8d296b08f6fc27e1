use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub message: String,
    pub photo_url: Option<String>,
    pub photo_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A post as found in storage, before defaults are applied.
///
/// Local blobs written by older builds or edited by hand may miss any field
/// or carry it with an unexpected type, so everything is optional here, a
/// malformed field reads as missing, and `with_defaults` fills the gaps.
/// The camelCase keys of the browser build are accepted too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredPost {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub message: Option<String>,
    #[serde(default, alias = "photoUrl", deserialize_with = "lenient::text")]
    pub photo_url: Option<String>,
    #[serde(default, alias = "photoPath", deserialize_with = "lenient::text")]
    pub photo_path: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient::timestamp")]
    pub created_at: Option<OffsetDateTime>,
}

impl StoredPost {
    pub fn with_defaults(self) -> Post {
        Post {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            photo_url: self.photo_url,
            photo_path: self.photo_path,
            created_at: self.created_at.unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    /// Strings as-is, numbers in their decimal form, anything else as missing.
    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    }

    /// RFC 3339 strings or epoch milliseconds.
    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => OffsetDateTime::parse(&text, &Rfc3339).ok(),
            Value::Number(number) => number
                .as_i64()
                .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub name: String,
    pub message: String,
}

impl NewPost {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Image attached to a new post, either uploaded by the visitor or a sticker.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl PhotoFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}
