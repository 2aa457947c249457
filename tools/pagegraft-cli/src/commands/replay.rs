//! Scripted session replay.
//!
//! A script lists canned responses per request URL and the steps to run
//! against them:
//!
//! ```json
//! {
//!   "assets": ["application-1.js"],
//!   "responses": {
//!     "/foo": [{ "page": { "data": { "a": {} } } }],
//!     "/foo?bzq=a": [{ "page": { "action": "graft", "path": "a", "data": { "b": 1 } } }]
//!   },
//!   "steps": [
//!     { "op": "visit", "url": "/foo" },
//!     { "op": "history", "url": "/foo" },
//!     { "op": "remote", "url": "/foo?bzq=a" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use pagegraft_core::{EngineConfig, PageResponse, PageState};
use pagegraft_engine::{IngestionPipeline, Notice, RemoteOptions, VisitOptions};
use pagegraft_fetch::{Method, Response, StaticTransport, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::ReplayArgs;
use crate::context::Context;
use crate::output::outcome_badge;

/// A scripted session.
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Assets of the running document.
    #[serde(default)]
    pub assets: Option<Vec<String>>,
    /// Canned responses per request URL, served in order.
    #[serde(default)]
    pub responses: BTreeMap<String, Vec<CannedResponse>>,
    /// Steps to run.
    pub steps: Vec<Step>,
}

/// One canned response.
#[derive(Debug, Deserialize)]
pub struct CannedResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Final URL when the response is the result of a redirect.
    #[serde(default)]
    pub redirected_to: Option<String>,
    /// Page payload. Takes precedence over `body`.
    #[serde(default)]
    pub page: Option<PageResponse>,
    /// Raw body.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_status() -> u16 {
    200
}

/// One replay step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Visit {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        body: String,
    },
    Remote {
        url: String,
        #[serde(default)]
        page_key: Option<String>,
    },
    History {
        url: String,
    },
}

impl Step {
    fn describe(&self) -> String {
        match self {
            Step::Visit { url, method, .. } => {
                format!("visit {} {}", method.as_deref().unwrap_or("GET"), url)
            }
            Step::Remote { url, .. } => format!("remote {}", url),
            Step::History { url } => format!("history {}", url),
        }
    }
}

/// Result of one step.
#[derive(Debug, Serialize)]
pub struct StepResult {
    pub step: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deferrals_resolved: usize,
    pub deferrals_failed: usize,
}

/// Result of a whole replay.
#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub steps: Vec<StepResult>,
    pub pages: BTreeMap<String, PageState>,
    #[serde(skip)]
    pub notices: Vec<Notice>,
}

/// Run the replay command.
pub async fn run(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let path = ctx.resolve_path(&args.script);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script: Script = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse script {}", path.display()))?;

    ctx.output.header(&format!("Replaying: {}", path.display()));
    let progress = ctx.output.progress(script.steps.len() as u64, "Replaying");
    let summary = replay(script, ctx.config.clone(), |_| progress.inc(1)).await?;
    progress.finish_and_clear();

    if ctx.output.is_json() {
        ctx.output.json(&summary);
        return Ok(());
    }

    for notice in &summary.notices {
        ctx.output.debug(&format!("{:?}", notice));
    }

    let total = summary.steps.len();
    for (i, step) in summary.steps.iter().enumerate() {
        let mut line = format!("{} {}", step.step, outcome_badge(&step.outcome));
        if let Some(page_key) = &step.page_key {
            line.push_str(&format!(" -> {}", page_key));
        }
        ctx.output.step(i + 1, total, &line);
        if let Some(error) = &step.error {
            ctx.output.warn(error);
        }
        if step.deferrals_failed > 0 {
            ctx.output.warn(&format!("{} deferred fetch(es) failed", step.deferrals_failed));
        }
    }

    ctx.output.success(&format!("Cached pages: {}", summary.pages.len()));
    for (page_key, page) in &summary.pages {
        if args.show_cache {
            ctx.output.kv(page_key, &serde_json::to_string(&page.data)?);
        } else {
            ctx.output.kv(page_key, &format!("{} fragment(s)", page.fragments.len()));
        }
    }

    Ok(())
}

/// Replay a script against canned responses.
///
/// Step failures are recorded in the summary rather than aborting the replay.
pub async fn replay(
    script: Script,
    config: EngineConfig,
    mut on_step: impl FnMut(&StepResult),
) -> Result<ReplaySummary> {
    let transport = Arc::new(build_transport(script.responses)?);
    let pipeline = IngestionPipeline::new(transport, config);
    if let Some(assets) = script.assets {
        pipeline.set_assets(assets);
    }
    let mut notices = pipeline.subscribe();

    let mut steps = Vec::with_capacity(script.steps.len());
    let mut collected = Vec::new();
    for step in script.steps {
        let result = run_step(&pipeline, &step).await?;
        on_step(&result);
        steps.push(result);
        drain_notices(&mut notices, &mut collected);
    }
    drain_notices(&mut notices, &mut collected);

    let pages = pipeline.with_cache(|cache| {
        cache
            .iter()
            .map(|(key, page)| (key.to_string(), page.clone()))
            .collect()
    });

    Ok(ReplaySummary {
        steps,
        pages,
        notices: collected,
    })
}

async fn run_step(pipeline: &IngestionPipeline, step: &Step) -> Result<StepResult> {
    let mut result = StepResult {
        step: step.describe(),
        outcome: "ok".to_string(),
        page_key: None,
        error: None,
        deferrals_resolved: 0,
        deferrals_failed: 0,
    };

    let remote = match step {
        Step::History { url } => {
            pipeline.record_history_change(url);
            return Ok(result);
        }
        Step::Visit { url, method, body } => {
            let method = match method {
                Some(m) => Method::from_bytes(m.to_uppercase().as_bytes())
                    .with_context(|| format!("Invalid method {m}"))?,
                None => Method::GET,
            };
            let options = VisitOptions::default()
                .with_method(method)
                .with_body(body.clone());
            pipeline.visit(url, options).await.map(|meta| {
                result.outcome = if meta.can_navigate { "current" } else { "superseded" }.to_string();
                meta.remote
            })
        }
        Step::Remote { url, page_key } => {
            let mut options = RemoteOptions::default();
            if let Some(page_key) = page_key {
                options = options.with_page_key(page_key.clone());
            }
            pipeline.remote(url, options).await
        }
    };

    match remote {
        Ok(meta) => {
            let failures = meta.ingest.deferrals.all_failures().len();
            result.page_key = Some(meta.page_key.to_string());
            result.deferrals_failed = failures;
            result.deferrals_resolved = count_resolved(&meta.ingest.deferrals);
        }
        Err(err) => {
            result.outcome = "failed".to_string();
            result.error = Some(err.to_string());
        }
    }

    Ok(result)
}

/// Move every pending notice into `out`, skipping past any the channel dropped.
fn drain_notices(notices: &mut broadcast::Receiver<Notice>, out: &mut Vec<Notice>) {
    loop {
        match notices.try_recv() {
            Ok(notice) => out.push(notice),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notice buffer overflowed, some notices were dropped");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn count_resolved(report: &pagegraft_engine::DeferralReport) -> usize {
    report
        .resolved
        .iter()
        .map(|nested| 1 + count_resolved(&nested.deferrals))
        .sum()
}

fn build_transport(responses: BTreeMap<String, Vec<CannedResponse>>) -> Result<StaticTransport> {
    let transport = StaticTransport::new();
    for (url, canned) in responses {
        for response in canned {
            let status = StatusCode::from_u16(response.status)
                .with_context(|| format!("Invalid status {} for {url}", response.status))?;
            let body = match (&response.page, response.body) {
                (Some(page), _) => serde_json::to_vec(page)?,
                (None, Some(body)) => body.into_bytes(),
                (None, None) => Vec::new(),
            };

            let mut built = Response::new(status, url.clone(), body);
            for (key, value) in response.headers {
                built = built.with_header(key, value);
            }
            if let Some(target) = response.redirected_to {
                built = built.redirected_to(target);
            }
            transport.push(url.clone(), built);
        }
    }
    Ok(transport)
}
