//! Navigation between cached pages.

use std::collections::BTreeSet;

use pagegraft_core::{PageKey, PageState};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{ComponentNotFound, EngineError};
use crate::notify::Notice;
use crate::pipeline::IngestionPipeline;

/// Browser-history collaborator.
pub trait History: Send + Sync {
    /// Push a new entry for `page_key`.
    fn push(&self, page_key: &PageKey);

    /// Replace the current entry with `page_key`.
    fn replace(&self, page_key: &PageKey);
}

/// How `navigate_to` records the move in history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryAction {
    #[default]
    Push,
    Replace,
}

/// Options for [`Navigator::navigate_to`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    /// History action.
    pub action: HistoryAction,
    /// Extra props handed to the rendered component.
    pub props: Value,
}

impl NavigateOptions {
    /// Push a new history entry.
    pub fn push() -> Self {
        Self::default()
    }

    /// Replace the current history entry.
    pub fn replace() -> Self {
        Self {
            action: HistoryAction::Replace,
            ..Self::default()
        }
    }

    /// Set the props.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }
}

/// The page currently shown.
#[derive(Debug, Clone, PartialEq)]
pub struct NavState {
    /// Key of the shown page.
    pub page_key: PageKey,
    /// Props passed along with it.
    pub props: Value,
}

/// What to do after the user moved back or forward in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopOutcome {
    /// The page is cached; show it.
    Restore(PageKey),
    /// The page is gone; load the URL from the server.
    Reload(String),
}

/// Switches the shown page among cached pages.
pub struct Navigator<H: History> {
    pipeline: IngestionPipeline,
    history: H,
    components: BTreeSet<String>,
    state: RwLock<NavState>,
}

impl<H: History> Navigator<H> {
    /// Create a navigator showing `initial_url` and replace the history entry
    /// with its page key.
    pub fn new(pipeline: IngestionPipeline, history: H, initial_url: &str) -> Self {
        let page_key = pipeline.page_key(initial_url);
        history.replace(&page_key);

        Self {
            pipeline,
            history,
            components: BTreeSet::new(),
            state: RwLock::new(NavState {
                page_key,
                props: Value::Null,
            }),
        }
    }

    /// Register a component identifier this navigator can render.
    pub fn with_component(mut self, identifier: impl Into<String>) -> Self {
        self.components.insert(identifier.into());
        self
    }

    /// The page currently shown.
    pub fn current(&self) -> NavState {
        self.state.read().clone()
    }

    /// A cached page.
    pub fn get_page(&self, page_key: &str) -> Option<PageState> {
        self.pipeline.get_page(page_key)
    }

    /// Show a cached page.
    ///
    /// Returns `false` and does nothing when the page is not cached.
    /// Otherwise records the move in history and supersedes any visit still
    /// in flight, so it can no longer navigate when it settles.
    pub fn navigate_to(&self, page_key: &str, options: NavigateOptions) -> bool {
        let page_key = self.pipeline.page_key(page_key);
        if !self.pipeline.has_page(page_key.as_str()) {
            tracing::debug!(page_key = %page_key, "navigate_to on uncached page");
            return false;
        }

        match options.action {
            HistoryAction::Push => self.history.push(&page_key),
            HistoryAction::Replace => self.history.replace(&page_key),
        }
        let _ = self.pipeline.sequencer().begin();

        *self.state.write() = NavState {
            page_key,
            props: options.props,
        };
        true
    }

    /// Record that history moved to `url`.
    pub fn on_history_change(&self, url: &str) {
        self.pipeline.record_history_change(url);
    }

    /// Handle a back/forward move to `url`.
    ///
    /// `page_key` is the key stored with the history entry, if the entry was
    /// created by this navigator.
    pub fn on_pop(&self, url: &str, page_key: Option<&str>) -> PopOutcome {
        self.on_history_change(url);

        match page_key.map(|key| self.pipeline.page_key(key)) {
            Some(page_key) if self.pipeline.has_page(page_key.as_str()) => {
                self.state.write().page_key = page_key.clone();
                PopOutcome::Restore(page_key)
            }
            _ => PopOutcome::Reload(url.to_string()),
        }
    }

    /// The registered component for the page currently shown.
    pub fn component(&self) -> Result<String, EngineError> {
        let page_key = self.state.read().page_key.clone();
        let identifier = self
            .pipeline
            .get_page(page_key.as_str())
            .and_then(|page| page.component_identifier);

        match identifier {
            Some(identifier) if self.components.contains(&identifier) => Ok(identifier),
            identifier => {
                let err = EngineError::from(ComponentNotFound { identifier });
                tracing::error!(page_key = %page_key, error = %err, "component not found");
                self.pipeline.notifier().notify(Notice::Error {
                    message: err.to_string(),
                    url: None,
                    page_key: Some(page_key),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pagegraft_core::{EngineConfig, PageResponse};
    use pagegraft_fetch::StaticTransport;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHistory {
        entries: Mutex<Vec<(&'static str, String)>>,
    }

    impl History for Arc<RecordingHistory> {
        fn push(&self, page_key: &PageKey) {
            self.entries.lock().push(("push", page_key.to_string()));
        }

        fn replace(&self, page_key: &PageKey) {
            self.entries.lock().push(("replace", page_key.to_string()));
        }
    }

    async fn setup() -> (IngestionPipeline, Arc<RecordingHistory>) {
        let pipeline =
            IngestionPipeline::new(Arc::new(StaticTransport::new()), EngineConfig::default());
        pipeline
            .ingest(
                "/foo",
                PageResponse::new(json!({"a": 1})).with_component("foo/show"),
            )
            .await
            .unwrap();
        (pipeline, Arc::new(RecordingHistory::default()))
    }

    #[tokio::test]
    async fn test_new_replaces_initial_entry() {
        let (pipeline, history) = setup().await;
        let nav = Navigator::new(pipeline, history.clone(), "/foo?__=1");

        assert_eq!(nav.current().page_key.as_str(), "/foo");
        assert_eq!(
            history.entries.lock().clone(),
            vec![("replace", "/foo".to_string())]
        );
    }

    #[tokio::test]
    async fn test_navigate_to_cached_page() {
        let (pipeline, history) = setup().await;
        pipeline
            .ingest("/bar", PageResponse::new(json!({})))
            .await
            .unwrap();
        let nav = Navigator::new(pipeline.clone(), history.clone(), "/foo");

        let visit = pipeline.sequencer().begin();
        assert!(nav.navigate_to("/bar", NavigateOptions::push().with_props(json!({"x": 1}))));

        assert_eq!(nav.current().page_key.as_str(), "/bar");
        assert_eq!(nav.current().props, json!({"x": 1}));
        assert_eq!(history.entries.lock().last().cloned(), Some(("push", "/bar".to_string())));
        assert!(!pipeline.sequencer().settle(&visit).is_current());
    }

    #[tokio::test]
    async fn test_navigate_to_uncached_page() {
        let (pipeline, history) = setup().await;
        let nav = Navigator::new(pipeline, history.clone(), "/foo");

        assert!(!nav.navigate_to("/missing", NavigateOptions::replace()));
        assert_eq!(nav.current().page_key.as_str(), "/foo");
        assert_eq!(history.entries.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_on_pop_restores_or_reloads() {
        let (pipeline, history) = setup().await;
        let nav = Navigator::new(pipeline.clone(), history, "/foo");

        assert_eq!(
            nav.on_pop("/foo", Some("/foo")),
            PopOutcome::Restore(PageKey::new("/foo"))
        );
        assert_eq!(
            nav.on_pop("/gone", Some("/gone")),
            PopOutcome::Reload("/gone".to_string())
        );
        assert_eq!(nav.on_pop("/other", None), PopOutcome::Reload("/other".to_string()));
        assert_eq!(pipeline.session().current_url.as_deref(), Some("/other"));
    }

    #[tokio::test]
    async fn test_component_lookup() {
        let (pipeline, history) = setup().await;
        let nav = Navigator::new(pipeline.clone(), history.clone(), "/foo").with_component("foo/show");
        assert_eq!(nav.component().unwrap(), "foo/show");

        let bare = Navigator::new(pipeline, history, "/foo");
        let mut notices = bare.pipeline.subscribe();
        let err = bare.component().unwrap_err();
        assert!(err.to_string().contains("foo/show"));
        assert!(matches!(notices.try_recv().unwrap(), Notice::Error { .. }));
    }
}
