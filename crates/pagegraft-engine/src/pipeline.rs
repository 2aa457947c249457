//! The ingestion pipeline.
//!
//! Every inbound page goes through the same steps: save or graft it into the
//! cache, broadcast the fragments it declares to every cached page holding
//! them, then resolve its `auto` deferments, each of which re-enters the
//! pipeline. `remote` and `visit` wrap those steps with a fetch.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use pagegraft_cache::{FragmentIndex, FragmentTable, GraftOutcome, PageCache};
use pagegraft_core::{EngineConfig, KeyNormalizer, PageKey, PageResponse, PageState};
use pagegraft_fetch::{FetchRequest, Method, ResponseMeta, StatusCode, Transport};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::defer::{DeferralReport, DeferralResolver};
use crate::error::EngineError;
use crate::notify::{Notice, Notifier};
use crate::sequencer::VisitSequencer;
use crate::session::SessionMeta;

/// Hook run on every fetched page before it is ingested.
///
/// Receives the currently cached page for the target key, if any, and the
/// received page. Returns the page to ingest.
pub type BeforeSave = Arc<dyn Fn(Option<&PageState>, PageResponse) -> PageResponse + Send + Sync>;

/// What ingestion did with a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A full page was saved.
    Saved,
    /// A graft was handed to the cache.
    Grafted(GraftOutcome),
    /// A graft arrived without a page key to apply it to.
    Skipped,
}

/// Result of ingesting one page, including its deferments.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Normalized key the page was ingested under.
    pub page_key: PageKey,
    /// Save or graft result.
    pub outcome: IngestOutcome,
    /// Pages changed by the fragment broadcast.
    pub fragments_touched: BTreeSet<PageKey>,
    /// Deferment results.
    pub deferrals: DeferralReport,
}

/// Options for [`IngestionPipeline::remote`].
#[derive(Clone, Default)]
pub struct RemoteOptions {
    /// HTTP method.
    pub method: Method,
    /// Request headers, passed through to the transport.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: String,
    /// Page to ingest into. Defaults to the session's current URL.
    pub page_key: Option<String>,
    /// Hook run before ingestion.
    pub before_save: Option<BeforeSave>,
}

impl RemoteOptions {
    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Target an explicit page.
    pub fn with_page_key(mut self, page_key: impl Into<String>) -> Self {
        self.page_key = Some(page_key.into());
        self
    }

    /// Set the before-save hook.
    pub fn with_before_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&PageState>, PageResponse) -> PageResponse + Send + Sync + 'static,
    {
        self.before_save = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for RemoteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteOptions")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("page_key", &self.page_key)
            .field("before_save", &self.before_save.is_some())
            .finish_non_exhaustive()
    }
}

/// Options for [`IngestionPipeline::visit`].
#[derive(Clone, Default)]
pub struct VisitOptions {
    /// HTTP method.
    pub method: Method,
    /// Request headers, passed through to the transport.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: String,
    /// Hook run before ingestion.
    pub before_save: Option<BeforeSave>,
}

impl VisitOptions {
    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the before-save hook.
    pub fn with_before_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&PageState>, PageResponse) -> PageResponse + Send + Sync + 'static,
    {
        self.before_save = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for VisitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitOptions")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("before_save", &self.before_save.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of a `remote` call.
#[derive(Debug, Clone)]
pub struct RemoteMeta {
    /// Key the page was ingested under.
    pub page_key: PageKey,
    /// Component that renders the page.
    pub component_identifier: Option<String>,
    /// The page references assets the session has not loaded.
    pub needs_refresh: bool,
    /// The transport followed a redirect.
    pub redirected: bool,
    /// Response status.
    pub status: StatusCode,
    /// Final response URL.
    pub url: String,
    /// The page as received, before the before-save hook.
    pub page: PageResponse,
    /// What ingestion did.
    pub ingest: IngestReport,
}

/// Result of a `visit` call.
#[derive(Debug, Clone)]
pub struct VisitMeta {
    /// Fetch and ingestion result.
    pub remote: RemoteMeta,
    /// No visit began after this one; the caller may navigate.
    pub can_navigate: bool,
}

struct Shared {
    cache: RwLock<PageCache>,
    session: RwLock<SessionMeta>,
    sequencer: VisitSequencer,
    normalizer: KeyNormalizer,
    resolver: DeferralResolver,
    transport: Arc<dyn Transport>,
    notifier: Notifier,
}

/// Orchestrates the page cache, fragment broadcast and deferral resolution.
///
/// Cheap to clone; clones share the same cache, session and sequencer. Cache
/// mutations happen under a write lock that is released before any await, so
/// no task ever observes a half-applied graft or broadcast.
#[derive(Clone)]
pub struct IngestionPipeline {
    shared: Arc<Shared>,
}

impl IngestionPipeline {
    /// Create a pipeline around a transport.
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let normalizer = KeyNormalizer::new(config.params);
        let session = SessionMeta {
            base_url: config.base_url,
            ..SessionMeta::default()
        };

        Self {
            shared: Arc::new(Shared {
                cache: RwLock::new(PageCache::new()),
                session: RwLock::new(session),
                sequencer: VisitSequencer::new(),
                resolver: DeferralResolver::new(normalizer.clone()),
                normalizer,
                transport,
                notifier: Notifier::new(config.notify.capacity),
            }),
        }
    }

    /// Subscribe to notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.shared.notifier.subscribe()
    }

    /// The key normalizer.
    pub fn normalizer(&self) -> &KeyNormalizer {
        &self.shared.normalizer
    }

    /// The visit sequencer.
    pub fn sequencer(&self) -> &VisitSequencer {
        &self.shared.sequencer
    }

    /// Normalize a URL into a page key.
    pub fn page_key(&self, url: &str) -> PageKey {
        self.shared.normalizer.page_key(url)
    }

    /// A copy of a cached page.
    pub fn get_page(&self, page_key: &str) -> Option<PageState> {
        let page_key = self.page_key(page_key);
        self.shared.cache.read().get(page_key.as_str()).cloned()
    }

    /// Whether a page is cached.
    pub fn has_page(&self, page_key: &str) -> bool {
        let page_key = self.page_key(page_key);
        self.shared.cache.read().contains(page_key.as_str())
    }

    /// Read the cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&PageCache) -> R) -> R {
        f(&self.shared.cache.read())
    }

    /// A copy of the session metadata.
    pub fn session(&self) -> SessionMeta {
        self.shared.session.read().clone()
    }

    /// Record the assets the running document was rendered against.
    pub fn set_assets(&self, assets: Vec<String>) {
        self.shared.session.write().assets = Some(assets);
    }

    /// Record a history change.
    pub fn record_history_change(&self, url: &str) {
        tracing::debug!(url = %url, "history changed");
        self.shared.session.write().current_url = Some(url.to_string());
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }

    /// Ingest a received page.
    ///
    /// Saves or grafts the page under the normalized `page_key`, broadcasts
    /// its fragments, then resolves its `auto` deferments. Fails only when a
    /// graft targets an uncached page; deferment failures are collected in
    /// the report.
    pub fn ingest(
        &self,
        page_key: &str,
        page: PageResponse,
    ) -> BoxFuture<'static, Result<IngestReport, EngineError>> {
        let pipeline = self.clone();
        let page_key = self.page_key(page_key);

        async move {
            let defers = page.defers().to_vec();
            let (outcome, fragments_touched) = match pipeline.store(&page_key, page) {
                Ok(stored) => stored,
                Err(err) => {
                    pipeline.report_error(&err, None, Some(&page_key));
                    return Err(err);
                }
            };

            let deferrals = pipeline
                .shared
                .resolver
                .resolve(&pipeline, &page_key, &defers)
                .await;

            Ok(IngestReport {
                page_key,
                outcome,
                fragments_touched,
                deferrals,
            })
        }
        .boxed()
    }

    /// Fetch a URL and ingest the response into a page.
    ///
    /// The cache-busters are removed from `url` but the fragment query is
    /// kept, so the server can render a single subtree. The page key is
    /// `options.page_key` or else the session's current URL.
    pub async fn remote(&self, url: &str, options: RemoteOptions) -> Result<RemoteMeta, EngineError> {
        let url = self.shared.normalizer.without_busters(url);
        let page_key = match &options.page_key {
            Some(page_key) => self.page_key(page_key),
            None => self.page_key(&self.current_url()),
        };

        let request = FetchRequest::new(options.method, url)
            .headers(options.headers)
            .body(options.body);
        let (response, page) = self.fetch_page(request).await?;

        self.finish(page_key, response, page, options.before_save.as_ref())
            .await
    }

    /// Fetch a URL as a navigation.
    ///
    /// All control parameters are removed from `url`. For non-GET requests a
    /// `Content-Location` header names the page instead; a redirected
    /// response is stored under its final URL. `can_navigate` is decided only
    /// after ingestion completes.
    pub async fn visit(&self, url: &str, options: VisitOptions) -> Result<VisitMeta, EngineError> {
        let url = self.page_key(url).to_string();
        let handle = self.shared.sequencer.begin();

        let request = FetchRequest::new(options.method, url.clone())
            .headers(options.headers)
            .body(options.body);
        let is_get = request.is_get();
        let (response, page) = self.fetch_page(request).await?;

        let mut page_key = if url.is_empty() {
            self.current_url()
        } else {
            url
        };
        if !is_get {
            if let Some(location) = &response.content_location {
                page_key = location.clone();
            }
        }
        if response.redirected {
            page_key = response.url.clone();
        }
        let page_key = self.page_key(&page_key);

        let remote = self
            .finish(page_key, response, page, options.before_save.as_ref())
            .await?;
        let can_navigate = self.shared.sequencer.settle(&handle).is_current();

        tracing::debug!(
            page_key = %remote.page_key,
            generation = handle.token().generation(),
            can_navigate,
            "visit settled"
        );

        Ok(VisitMeta {
            remote,
            can_navigate,
        })
    }

    fn current_url(&self) -> String {
        self.shared
            .session
            .read()
            .current_url
            .clone()
            .unwrap_or_default()
    }

    async fn fetch_page(
        &self,
        request: FetchRequest,
    ) -> Result<(ResponseMeta, PageResponse), EngineError> {
        let url = request.url.clone();
        self.shared.notifier.notify(Notice::BeforeFetch {
            url: url.clone(),
            method: request.method.to_string(),
        });
        tracing::debug!(url = %url, method = %request.method, "fetching");

        let result = match self.shared.transport.fetch(request).await {
            Ok(response) => response.into_page(),
            Err(err) => Err(err),
        };

        result.map_err(|err| {
            let err = EngineError::from(err);
            let page_key = self.page_key(&url);
            self.report_error(&err, Some(&url), Some(&page_key));
            err
        })
    }

    async fn finish(
        &self,
        page_key: PageKey,
        response: ResponseMeta,
        received: PageResponse,
        before_save: Option<&BeforeSave>,
    ) -> Result<RemoteMeta, EngineError> {
        let needs_refresh = self.shared.session.read().needs_refresh(&received.assets);

        let page = match before_save {
            Some(hook) => {
                let prev = self.get_page(page_key.as_str());
                hook(prev.as_ref(), received.clone())
            }
            None => received.clone(),
        };

        let ingest = self.ingest(page_key.as_str(), page).await?;

        Ok(RemoteMeta {
            page_key,
            component_identifier: received.component_identifier.clone(),
            needs_refresh,
            redirected: response.redirected,
            status: response.status,
            url: response.url,
            page: received,
            ingest,
        })
    }

    fn store(
        &self,
        page_key: &PageKey,
        page: PageResponse,
    ) -> Result<(IngestOutcome, BTreeSet<PageKey>), EngineError> {
        let mut cache = self.shared.cache.write();

        // Only content that actually landed in the cache is broadcast.
        let (outcome, table) = if page.is_graft() {
            if page_key.is_empty() {
                tracing::debug!("graft without a page key, skipping");
                (IngestOutcome::Skipped, FragmentTable::new())
            } else {
                let outcome = cache.graft(page_key, &page)?;
                let table = match &outcome {
                    GraftOutcome::Applied { path } => {
                        self.shared.notifier.notify(Notice::Grafted {
                            page_key: page_key.clone(),
                            path: path.clone(),
                        });
                        FragmentIndex::extract(&page)
                    }
                    GraftOutcome::EmptyTarget { path } => {
                        tracing::warn!(
                            page_key = %page_key,
                            path = %path,
                            "graft returned no node at that path, check the request's key path"
                        );
                        self.shared.notifier.notify(Notice::EmptyGraftTarget {
                            page_key: page_key.clone(),
                            path: path.clone(),
                        });
                        FragmentTable::new()
                    }
                    GraftOutcome::NoPath => FragmentTable::new(),
                };
                (IngestOutcome::Grafted(outcome), table)
            }
        } else {
            if let Some(token) = &page.csrf_token {
                self.shared.session.write().csrf_token = Some(token.clone());
            }
            let saved = cache.save(page_key.clone(), page);
            let table = FragmentIndex::extract_state(saved);
            self.shared.notifier.notify(Notice::Saved {
                page_key: page_key.clone(),
            });
            (IngestOutcome::Saved, table)
        };

        if table.is_empty() {
            return Ok((outcome, BTreeSet::new()));
        }

        let touched = cache.broadcast(&table);
        if !touched.is_empty() {
            tracing::debug!(
                fragments = table.len(),
                pages = touched.len(),
                "fragments broadcast"
            );
            self.shared.notifier.notify(Notice::FragmentsUpdated {
                fragments: table.keys().cloned().collect(),
                pages: touched.iter().cloned().collect(),
            });
        }

        Ok((outcome, touched))
    }

    fn report_error(&self, err: &EngineError, url: Option<&str>, page_key: Option<&PageKey>) {
        tracing::error!(
            url = url.unwrap_or_default(),
            page_key = %page_key.map(PageKey::as_str).unwrap_or_default(),
            error = %err,
            "request failed"
        );
        self.shared.notifier.notify(Notice::Error {
            message: err.to_string(),
            url: url.map(str::to_string),
            page_key: page_key.cloned(),
        });
    }
}

impl fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("pages", &self.shared.cache.read().len())
            .field("session", &*self.shared.session.read())
            .field("visit", &self.shared.sequencer.current())
            .finish_non_exhaustive()
    }
}
