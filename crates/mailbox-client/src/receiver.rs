//! Message receiver with polling.

use crate::client::MailboxClient;
use crate::types::MailMessage;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};

/// Backoff applied after a fetch error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-lived receiver that polls the relay for unseen messages.
///
/// Dropping the stream stops the receiver; an in-flight fetch completes
/// first, which is what gives the main loop its graceful shutdown.
pub struct MessageReceiver {
    client: MailboxClient,
    poll_interval: Duration,
}

impl MessageReceiver {
    pub fn new(client: MailboxClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Start receiving messages as an async stream.
    pub fn stream(self) -> impl Stream<Item = MailMessage> {
        async_stream::stream! {
            loop {
                match self.client.fetch_unseen().await {
                    Ok(messages) => {
                        for message in messages {
                            debug!("Received {} from {}", message.uid, message.from);
                            yield message;
                        }
                    }
                    Err(e) => {
                        error!("Mailbox fetch error: {}", e);
                        sleep(ERROR_BACKOFF).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
