//! Conference provider integration: auth, API client, pool jobs, status
//! aggregation, and the member registration sweep.

pub mod aggregator;
pub mod api;
pub mod auth;
pub mod jobs;
pub mod models;
pub mod registration;

pub use aggregator::{spawn_status_aggregator, StatusEvent, BATCH_SIZE};
pub use api::ZoomClient;
pub use jobs::ZoomJob;
pub use models::{Attendee, EventType};
