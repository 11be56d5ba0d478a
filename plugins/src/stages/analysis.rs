use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use taleforge_core::api::{StageContext, StageError, StageOutput, Stage, StepSpec, TaskStatus};

use super::fallback::{generate_or_fallback, GenerationPolicy};
use super::{describe_request, ANALYSIS_KEY, JSON_ONLY};
use crate::llm::{GenerationPrompt, TextGenerator};

pub const ANALYZE_REQUEST: &str = "analyze_request";

/// Extracts themes, tone and key elements from the request.
pub struct AnalysisStage {
    generator: Arc<dyn TextGenerator>,
    policy: GenerationPolicy,
}

impl AnalysisStage {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: GenerationPolicy) -> Self {
        Self { generator, policy }
    }
}

#[async_trait]
impl Stage for AnalysisStage {
    fn name(&self) -> &str {
        "analysis"
    }

    fn phase(&self) -> TaskStatus {
        TaskStatus::Analyzing
    }

    fn steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new(ANALYZE_REQUEST, 0.20)]
    }

    async fn execute(&self, step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError> {
        if step.label != ANALYZE_REQUEST {
            return Err(StageError::new(self.name(), format!("unknown step '{}'", step.label)));
        }

        let req = ctx.request();
        let prompt = GenerationPrompt::new(ANALYZE_REQUEST, &req.subject_title, req.subject_type)
            .with_system(format!(
                "You are a narrative designer breaking down content requests for a game. {JSON_ONLY}"
            ))
            .with_user(format!(
                "{}\n\nReturn {{\"themes\": [string], \"tone\": string, \"key_elements\": [string], \"scope\": string}}.",
                describe_request(ctx)
            ));

        let title = req.subject_title.trim().to_string();
        let kind = req.subject_type.as_str();
        let analysis = generate_or_fallback(
            self.generator.as_ref(),
            &prompt,
            self.policy,
            ctx.cancellation(),
            || {
                json!({
                    "themes": [kind],
                    "tone": "neutral",
                    "key_elements": [title],
                    "scope": "standard",
                })
            },
        )
        .await;

        Ok(StageOutput::with_value(ANALYSIS_KEY, analysis))
    }
}
