//! Out-of-band notifications.
//!
//! Tools report side effects here instead of through the turn's event stream:
//! chat errors go to the session's client, canvas updates fan out to everyone
//! viewing that canvas.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use easel_canvas::CanvasEvent;
use easel_core::ClientEvent;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Push an event to the session's chat client.
    async fn send_to_session(&self, session_id: &str, event: ClientEvent);

    /// Fan a canvas update out to the session's canvas viewers.
    async fn broadcast_canvas(&self, session_id: &str, event: CanvasEvent);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Notification {
    Session {
        session_id: String,
        event: ClientEvent,
    },
    Canvas {
        session_id: String,
        event: CanvasEvent,
    },
}

/// Forwards notifications into an unbounded channel. Sends after the receiver
/// is gone are dropped.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            debug!("Notification receiver closed, dropping");
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send_to_session(&self, session_id: &str, event: ClientEvent) {
        self.send(Notification::Session {
            session_id: session_id.to_string(),
            event,
        });
    }

    async fn broadcast_canvas(&self, session_id: &str, event: CanvasEvent) {
        self.send(Notification::Canvas {
            session_id: session_id.to_string(),
            event,
        });
    }
}
