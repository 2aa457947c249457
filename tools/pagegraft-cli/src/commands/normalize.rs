//! URL normalization command.

use anyhow::Result;
use pagegraft_core::KeyNormalizer;
use serde::Serialize;

use super::NormalizeArgs;
use crate::context::Context;

#[derive(Debug, Serialize)]
struct Normalized {
    page_key: String,
    request_url: String,
    key_path: Option<String>,
}

/// Run the normalize command.
pub async fn run(args: NormalizeArgs, ctx: &Context) -> Result<()> {
    let normalized = normalize(&KeyNormalizer::new(ctx.config.params.clone()), &args.url);

    if ctx.output.is_json() {
        ctx.output.json(&normalized);
        return Ok(());
    }

    ctx.output.header(&args.url);
    ctx.output.kv("page key", &normalized.page_key);
    ctx.output.kv("request url", &normalized.request_url);
    ctx.output.kv(
        "key path",
        normalized.key_path.as_deref().unwrap_or("(full page)"),
    );

    Ok(())
}

fn normalize(normalizer: &KeyNormalizer, url: &str) -> Normalized {
    Normalized {
        page_key: normalizer.page_key(url).to_string(),
        request_url: normalizer.without_busters(url),
        key_path: normalizer.key_path(url).map(|p| p.to_string()),
    }
}
