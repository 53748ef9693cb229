use std::sync::Arc;

use hare_core::queue::QueueName;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{consumer::ConsumerRegistry, delivery, virtual_host::VirtualHost};

/// How many notifications can be pending for one queue. Notifications carry no data, so a full
/// channel already guarantees the worker will look at the queue again.
pub const QUEUE_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// The queue may have messages that can be pushed to a consumer
    MessageAvailable,
    Shutdown,
}

pub type QueueEventSender = mpsc::Sender<QueueEvent>;
pub type QueueEventReceiver = mpsc::Receiver<QueueEvent>;

/// Pushes the messages of one queue to its consumers whenever it is notified.
#[derive(Debug)]
pub struct QueueTask {
    vhost: Arc<VirtualHost>,
    consumers: Arc<ConsumerRegistry>,
    event_recv: QueueEventReceiver,
    queue: QueueName,
}

impl QueueTask {
    fn show_name(&self) -> &str {
        self.queue.as_str()
    }

    pub fn new(
        vhost: Arc<VirtualHost>,
        consumers: Arc<ConsumerRegistry>,
        event_recv: QueueEventReceiver,
        queue: QueueName,
    ) -> Self {
        Self {
            vhost,
            consumers,
            event_recv,
            queue,
        }
    }

    #[tracing::instrument(skip(self), fields(name = self.show_name()))]
    pub async fn start(mut self) {
        info!("Started queue worker task");

        loop {
            let next_event = self.event_recv.recv().await;

            match next_event {
                Some(QueueEvent::MessageAvailable) => self.handle_message_available(),
                Some(QueueEvent::Shutdown) | None => {
                    self.cleanup();
                    return;
                }
            }
        }
    }

    #[tracing::instrument(skip(self), fields(name = self.show_name()), level = "debug")]
    fn handle_message_available(&mut self) {
        match delivery::drain(&self.vhost, &self.consumers, &self.queue) {
            Ok(0) => {}
            Ok(delivered) => debug!(delivered, "Pushed messages"),
            Err(err) => error!(%err, "Failed to push messages"),
        }
    }

    fn cleanup(&mut self) {
        self.event_recv.close();
        info!(queue = %self.queue, "Stopped queue worker task");
    }
}
