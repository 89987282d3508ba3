//! SMS provider integration: client, jobs, and phone normalization.

pub mod api;
pub mod jobs;
pub mod phone;

pub use api::{MessageStatus, OpenPhoneClient};
pub use jobs::SmsJob;
pub use phone::normalize_phone;
