//! Outbound notifications
//!
//! The core never depends on a mail transport. It renders a [`Notification`]
//! and hands it to whatever [`Notifier`] the portal was built with, on a
//! background thread, after the triggering transaction has committed. A failed
//! send is logged and dropped. Short-lived callers use [`Dispatcher::flush`]
//! to wait for sends still in flight before exiting.

mod backends;
mod errors;
mod templates;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

pub use backends::{LogNotifier, OutboxEntry, OutboxNotifier, RecordingNotifier, SentMessage};
pub use errors::NotifyError;
pub use templates::{Audience, Message, Notification};

/// Delivery hook for account and issue lifecycle messages.
pub trait Notifier: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Background sender shared by the services; see [`Dispatcher::flush`].
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    frontend_url: String,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, frontend_url: impl Into<String>) -> Self {
        Self {
            notifier,
            frontend_url: frontend_url.into(),
            pending: Arc::default(),
        }
    }

    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }

    /// Render `notification` and send it to `to` in the background.
    pub fn dispatch(&self, to: &str, notification: Notification) {
        let kind = notification.kind();
        let message = notification.render(&self.frontend_url);
        let notifier = Arc::clone(&self.notifier);
        let recipient = to.to_string();

        let spawned = thread::Builder::new()
            .name("notify".to_string())
            .spawn(move || {
                if let Err(e) = notifier.send(&recipient, &message.subject, &message.body) {
                    tracing::warn!(to = %recipient, kind, error = %e, "notification failed");
                }
            });

        match spawned {
            Ok(handle) => {
                let mut pending = self.pending.lock();
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
            }
            Err(e) => tracing::warn!(to, kind, error = %e, "could not start notification thread"),
        }
    }

    /// Blocks until every send started so far has finished.
    ///
    /// Returns how many sends were waited on.
    pub fn flush(&self) -> usize {
        let handles = std::mem::take(&mut *self.pending.lock());
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("notification thread panicked");
            }
        }
        count
    }
}
