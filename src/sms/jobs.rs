//! SMS-pool job variants.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pool::{JobError, PoolJob};
use crate::sms::api::OpenPhoneClient;

/// Work items executed by the SMS worker pool.
pub enum SmsJob {
    /// Deliver one rendered text message.
    Send {
        client: Arc<OpenPhoneClient>,
        to_number: String,
        from_number: String,
        content: String,
    },
}

impl PoolJob for SmsJob {
    fn execute(
        &self,
        _cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), JobError>> + Send + '_>> {
        Box::pin(async move {
            match self {
                Self::Send {
                    client,
                    to_number,
                    from_number,
                    content,
                } => client
                    .send_message(to_number, from_number, content)
                    .await
                    .map(|_| ()),
            }
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send_sms",
        }
    }
}
