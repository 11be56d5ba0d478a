//! The standard content pipeline: analyze the request, generate world,
//! characters and narrative, then validate and assemble the result.

mod analysis;
mod content;
pub mod fallback;
mod validation;

pub use analysis::AnalysisStage;
pub use content::ContentStage;
pub use fallback::{generate_or_fallback, GenerationPolicy};
pub use validation::ValidationStage;

use serde_json::Value;
use taleforge_core::api::{StageContext, StageError};

pub const ANALYSIS_KEY: &str = "analysis";
pub const WORLD_KEY: &str = "world";
pub const CHARACTERS_KEY: &str = "characters";
pub const NARRATIVE_KEY: &str = "narrative";
pub const VALIDATION_KEY: &str = "validation";

/// Context value an earlier step must have produced.
pub(crate) fn require<'a>(
    ctx: &'a StageContext,
    stage: &str,
    key: &str,
) -> Result<&'a Value, StageError> {
    ctx.get(key)
        .ok_or_else(|| StageError::new(stage, format!("missing '{key}' in context")))
}

/// Request summary shared by every prompt.
pub(crate) fn describe_request(ctx: &StageContext) -> String {
    let req = ctx.request();
    let mut out = format!(
        "Subject: {} (type: {})",
        req.subject_title.trim(),
        req.subject_type
    );
    if let Some(extra) = req.additional_context.as_deref().filter(|s| !s.trim().is_empty()) {
        out.push_str("\nAdditional context: ");
        out.push_str(extra.trim());
    }
    if !req.options.is_empty() {
        let opts: Vec<String> = req
            .options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        out.push_str("\nOptions: ");
        out.push_str(&opts.join(", "));
    }
    out
}

pub(crate) const JSON_ONLY: &str =
    "Answer with a single JSON object and nothing else. Do not wrap it in prose.";
