//! Event channel connecting a running stream to its consumer.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::StreamEvent;

/// Async stream of pipeline events, consumed by the transport layer.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    /// Create a new event stream with sender/receiver pair.
    pub fn new(buffer_size: usize) -> (EventSender, Self) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (EventSender { sender }, Self { receiver })
    }

    /// Receive the next event, if available.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Collect events until a terminal event or channel close.
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

/// Sender half for pushing events to a stream.
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::Sender<StreamEvent>,
}

impl EventSender {
    /// Send an event to the stream. Fails once the consumer is gone.
    pub async fn send(&self, event: StreamEvent) -> Result<(), EventSendError> {
        self.sender.send(event).await.map_err(|_| EventSendError)
    }

    /// Close the stream by dropping the sender.
    pub fn close(self) {
        drop(self.sender);
    }
}

/// The consumer dropped its receiver.
#[derive(Debug, Error)]
#[error("event stream closed")]
pub struct EventSendError;
