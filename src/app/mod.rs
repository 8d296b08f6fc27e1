pub mod admin;
pub mod fallback;
pub mod local;
pub mod photos;
pub mod posts;
pub mod remote;
pub mod stickers;
pub mod validation;
