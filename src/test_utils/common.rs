use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ConfigSchema;
use crate::Feed;
use crate::FeedItem;
use crate::ValueKind;

/// `app.name`, `app.port`, `app.debug`, `app.tags`, `limits.rates`,
/// `limits.flags`
pub fn test_schema() -> Arc<ConfigSchema> {
    let schema = ConfigSchema::builder()
        .group("app", |g| {
            g.leaf("name", ValueKind::String)
                .leaf("port", ValueKind::Number)
                .leaf("debug", ValueKind::Boolean)
                .leaf("tags", ValueKind::StringArray)
        })
        .group("limits", |g| {
            g.leaf("rates", ValueKind::NumberArray)
                .leaf("flags", ValueKind::BooleanArray)
        })
        .build()
        .unwrap();
    Arc::new(schema)
}

/// Feed driven by the returned sender
pub fn feed_channel() -> (mpsc::UnboundedSender<FeedItem>, Feed) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Box::pin(UnboundedReceiverStream::new(rx)))
}

/// Polls `condition` until it holds or one second has passed.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
