use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use taleforge_core::api::{StageContext, StageError, StageOutput, Stage, StepSpec, TaskStatus};

use super::fallback::{generate_or_fallback, GenerationPolicy};
use super::{
    describe_request, require, ANALYSIS_KEY, CHARACTERS_KEY, JSON_ONLY, NARRATIVE_KEY, WORLD_KEY,
};
use crate::llm::{GenerationPrompt, TextGenerator};

pub const WORLD_BUILDING: &str = "world_building";
pub const CHARACTERS: &str = "characters";
pub const NARRATIVE: &str = "narrative";

/// Generates the world, its characters and the narrative, one step each.
/// Every step builds on what the previous steps put in the context.
pub struct ContentStage {
    generator: Arc<dyn TextGenerator>,
    policy: GenerationPolicy,
}

impl ContentStage {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: GenerationPolicy) -> Self {
        Self { generator, policy }
    }

    fn prompt(
        &self,
        ctx: &StageContext,
        purpose: &str,
        ask: &str,
        background: &[(&str, &Value)],
    ) -> GenerationPrompt {
        let req = ctx.request();
        let mut user = describe_request(ctx);
        for (label, value) in background {
            user.push_str(&format!("\n\n{label}:\n{value}"));
        }
        user.push_str("\n\n");
        user.push_str(ask);

        GenerationPrompt::new(purpose, &req.subject_title, req.subject_type)
            .with_system(format!(
                "You are a game writer producing consistent, original content. {JSON_ONLY}"
            ))
            .with_user(user)
    }

    async fn generate(&self, ctx: &StageContext, prompt: GenerationPrompt, fallback: Value) -> Value {
        generate_or_fallback(
            self.generator.as_ref(),
            &prompt,
            self.policy,
            ctx.cancellation(),
            move || fallback,
        )
        .await
    }
}

#[async_trait]
impl Stage for ContentStage {
    fn name(&self) -> &str {
        "content"
    }

    fn phase(&self) -> TaskStatus {
        TaskStatus::Generating
    }

    fn steps(&self) -> Vec<StepSpec> {
        vec![
            StepSpec::new(WORLD_BUILDING, 0.25),
            StepSpec::new(CHARACTERS, 0.20),
            StepSpec::new(NARRATIVE, 0.20),
        ]
    }

    async fn execute(&self, step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let title = ctx.request().subject_title.trim().to_string();
        let analysis = require(ctx, self.name(), ANALYSIS_KEY)?;

        match step.label.as_str() {
            WORLD_BUILDING => {
                let prompt = self.prompt(
                    ctx,
                    WORLD_BUILDING,
                    "Describe the setting. Return {\"name\": string, \"setting\": string, \"regions\": [string], \"history\": string}.",
                    &[("Analysis", analysis)],
                );
                let fallback = json!({
                    "name": title,
                    "setting": format!("The lands surrounding {title}."),
                    "regions": [],
                    "history": "",
                });
                let world = self.generate(ctx, prompt, fallback).await;
                Ok(StageOutput::with_value(WORLD_KEY, world))
            }
            CHARACTERS => {
                let world = require(ctx, self.name(), WORLD_KEY)?;
                let prompt = self.prompt(
                    ctx,
                    CHARACTERS,
                    "Create the key characters. Return {\"characters\": [{\"name\": string, \"role\": string, \"motivation\": string}]}.",
                    &[("Analysis", analysis), ("World", world)],
                );
                let fallback = json!({
                    "characters": [{
                        "name": format!("Keeper of {title}"),
                        "role": "guide",
                        "motivation": "protect what remains",
                    }],
                });
                let characters = self.generate(ctx, prompt, fallback).await;
                Ok(StageOutput::with_value(CHARACTERS_KEY, characters))
            }
            NARRATIVE => {
                let world = require(ctx, self.name(), WORLD_KEY)?;
                let characters = require(ctx, self.name(), CHARACTERS_KEY)?;
                let prompt = self.prompt(
                    ctx,
                    NARRATIVE,
                    "Write the story outline. Return {\"hook\": string, \"arcs\": [string], \"resolution\": string}.",
                    &[("World", world), ("Characters", characters)],
                );
                let fallback = json!({
                    "hook": format!("Something stirs in {title}."),
                    "arcs": [],
                    "resolution": "",
                });
                let narrative = self.generate(ctx, prompt, fallback).await;
                Ok(StageOutput::with_value(NARRATIVE_KEY, narrative))
            }
            other => Err(StageError::new(self.name(), format!("unknown step '{other}'"))),
        }
    }
}
