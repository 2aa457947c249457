//! Resolution of `auto` deferments.

use futures::future::join_all;
use pagegraft_core::{DeferDescriptor, KeyNormalizer, PageKey};

use crate::error::DeferredFetchError;
use crate::notify::Notice;
use crate::pipeline::{IngestReport, IngestionPipeline, RemoteOptions};

/// What happened to the deferments of one ingestion.
#[derive(Debug, Clone, Default)]
pub struct DeferralReport {
    /// Ingestion reports of the deferments that succeeded, in declaration order.
    pub resolved: Vec<IngestReport>,
    /// Deferments that failed.
    pub failed: Vec<DeferredFetchError>,
}

impl DeferralReport {
    /// Whether no deferment was attempted.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.failed.is_empty()
    }

    /// Failures here and in every nested deferment.
    pub fn all_failures(&self) -> Vec<&DeferredFetchError> {
        let mut failures: Vec<_> = self.failed.iter().collect();
        for report in &self.resolved {
            failures.extend(report.deferrals.all_failures());
        }
        failures
    }
}

/// Issues follow-up fetches for `auto` deferments.
///
/// Each deferment is fetched with `remote` scoped to the declaring page, so
/// its response goes through the whole pipeline again, including its own
/// deferments. Manual deferments are skipped and stay in the cached page.
#[derive(Debug, Clone, Default)]
pub struct DeferralResolver {
    normalizer: KeyNormalizer,
}

impl DeferralResolver {
    /// Create a resolver that reads key paths with `normalizer`'s parameters.
    pub fn new(normalizer: KeyNormalizer) -> Self {
        Self { normalizer }
    }

    /// Fetch every `auto` deferment concurrently and wait for all of them.
    pub async fn resolve(
        &self,
        pipeline: &IngestionPipeline,
        page_key: &PageKey,
        defers: &[DeferDescriptor],
    ) -> DeferralReport {
        let fetches = defers.iter().filter(|d| d.is_auto()).map(|defer| {
            let options = RemoteOptions::default().with_page_key(page_key.as_str());
            async move {
                pipeline
                    .remote(&defer.url, options)
                    .await
                    .map(|meta| meta.ingest)
                    .map_err(|err| (defer, err))
            }
        });

        let mut report = DeferralReport::default();
        for result in join_all(fetches).await {
            match result {
                Ok(ingest) => report.resolved.push(ingest),
                Err((defer, err)) => {
                    let key_path = self.normalizer.key_path(&defer.url);
                    tracing::error!(
                        url = %defer.url,
                        page_key = %page_key,
                        key_path = ?key_path,
                        error = %err,
                        "deferred fetch failed"
                    );
                    pipeline.notifier().notify(Notice::GraftingError {
                        url: defer.url.clone(),
                        page_key: page_key.clone(),
                        key_path: key_path.clone(),
                        message: err.to_string(),
                    });
                    report.failed.push(DeferredFetchError {
                        url: defer.url.clone(),
                        page_key: page_key.clone(),
                        key_path,
                        source: Box::new(err),
                    });
                }
            }
        }
        report
    }
}
