//! In-memory views over persisted records.

pub mod email_template;
pub mod member;
pub mod registration;

pub use email_template::EmailTemplate;
pub use member::Member;
pub use registration::MemberRegistration;
