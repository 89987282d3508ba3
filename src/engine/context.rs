//! Shared dependencies handed to job handlers.

use std::sync::Arc;

use crate::email::BrevoClient;
use crate::pool::PoolHandle;
use crate::sms::{OpenPhoneClient, SmsJob};
use crate::store::RecordStore;
use crate::zoom::{ZoomClient, ZoomJob};

/// Everything a handler needs to expand a due job record into pool jobs.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: RecordStore,
    pub zoom: Arc<ZoomClient>,
    pub sms: Arc<OpenPhoneClient>,
    pub email: Arc<BrevoClient>,
    pub zoom_pool: PoolHandle<ZoomJob>,
    pub sms_pool: PoolHandle<SmsJob>,
}
