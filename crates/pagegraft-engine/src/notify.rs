//! Structured notifications.

use pagegraft_core::{FragmentName, KeyPath, PageKey};
use tokio::sync::broadcast;

/// A notification published by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A fetch is about to be issued.
    BeforeFetch { url: String, method: String },
    /// A full page was saved.
    Saved { page_key: PageKey },
    /// A graft was applied.
    Grafted { page_key: PageKey, path: KeyPath },
    /// Fragments were written into cached pages.
    FragmentsUpdated {
        fragments: Vec<FragmentName>,
        pages: Vec<PageKey>,
    },
    /// A graft targeted a path with no node; the cache was not changed.
    EmptyGraftTarget { page_key: PageKey, path: KeyPath },
    /// An `auto` deferment failed.
    GraftingError {
        url: String,
        page_key: PageKey,
        key_path: Option<KeyPath>,
        message: String,
    },
    /// A top-level operation failed.
    Error {
        message: String,
        url: Option<String>,
        page_key: Option<PageKey>,
    },
}

/// Publishes notices to every subscriber.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Notifier {
    /// Create a notifier buffering `capacity` notices per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Publish a notice. Having no subscribers is fine.
    pub fn notify(&self, notice: Notice) {
        let _ = self.sender.send(notice);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_subscribers() {
        Notifier::new(4).notify(Notice::Saved {
            page_key: PageKey::new("/foo"),
        });
    }

    #[test]
    fn test_subscriber_receives_notice() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify(Notice::Saved {
            page_key: PageKey::new("/foo"),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            Notice::Saved {
                page_key: PageKey::new("/foo")
            }
        );
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let notifier = Notifier::new(0);
        let mut rx = notifier.subscribe();
        notifier.notify(Notice::Saved {
            page_key: PageKey::new("/foo"),
        });
        assert!(rx.try_recv().is_ok());
    }
}
