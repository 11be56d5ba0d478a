use async_trait::async_trait;
use serde_json::{json, Value};
use taleforge_core::api::{
    StageContext, StageError, StageOutput, Stage, StepSpec, TaskStatus, RESULT_KEY,
};

use super::fallback::is_degraded;
use super::{require, ANALYSIS_KEY, CHARACTERS_KEY, NARRATIVE_KEY, VALIDATION_KEY, WORLD_KEY};

pub const VALIDATE_CONTENT: &str = "validate_content";
pub const ASSEMBLE_RESULT: &str = "assemble_result";

const SECTIONS: [&str; 4] = [ANALYSIS_KEY, WORLD_KEY, CHARACTERS_KEY, NARRATIVE_KEY];

/// Checks the generated sections and assembles the final result object.
///
/// Shape problems are reported in the `validation` section, they do not fail
/// the task. A section missing from the context does.
#[derive(Debug, Default)]
pub struct ValidationStage;

impl ValidationStage {
    pub fn new() -> Self {
        Self
    }

    fn validate(&self, ctx: &StageContext) -> Result<Value, StageError> {
        let mut issues = Vec::new();
        let mut degraded = Vec::new();

        for key in SECTIONS {
            let value = require(ctx, self.name(), key)?;
            if !value.is_object() {
                issues.push(format!("{key}: expected an object"));
                continue;
            }
            if is_degraded(value) {
                degraded.push(key);
            }
        }

        let world = require(ctx, self.name(), WORLD_KEY)?;
        if non_empty_str(world, "name").is_none() {
            issues.push("world: missing name".to_string());
        }

        let characters = require(ctx, self.name(), CHARACTERS_KEY)?;
        match characters.get("characters").and_then(Value::as_array) {
            Some(list) if list.is_empty() => issues.push("characters: list is empty".to_string()),
            Some(list) => {
                let unnamed = list
                    .iter()
                    .filter(|c| non_empty_str(c, "name").is_none())
                    .count();
                if unnamed > 0 {
                    issues.push(format!("characters: {unnamed} without a name"));
                }
            }
            None => issues.push("characters: missing character list".to_string()),
        }

        let narrative = require(ctx, self.name(), NARRATIVE_KEY)?;
        if non_empty_str(narrative, "hook").is_none() {
            issues.push("narrative: missing hook".to_string());
        }

        Ok(json!({
            "passed": issues.is_empty(),
            "issues": issues,
            "degraded_sections": degraded,
        }))
    }

    fn assemble(&self, ctx: &StageContext) -> Result<Value, StageError> {
        let req = ctx.request();
        let validation = require(ctx, self.name(), VALIDATION_KEY)?;
        let mut result = json!({
            "subject": {
                "title": req.subject_title.trim(),
                "type": req.subject_type,
            },
            "validation": validation,
            "generated_at": chrono::Utc::now().to_rfc3339(),
        });
        for key in SECTIONS {
            result[key] = require(ctx, self.name(), key)?.clone();
        }
        Ok(result)
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &str {
        "validation"
    }

    fn phase(&self) -> TaskStatus {
        TaskStatus::Validating
    }

    fn steps(&self) -> Vec<StepSpec> {
        vec![
            StepSpec::new(VALIDATE_CONTENT, 0.10),
            StepSpec::new(ASSEMBLE_RESULT, 0.05),
        ]
    }

    async fn execute(&self, step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError> {
        match step.label.as_str() {
            VALIDATE_CONTENT => Ok(StageOutput::with_value(VALIDATION_KEY, self.validate(ctx)?)),
            ASSEMBLE_RESULT => Ok(StageOutput::with_value(RESULT_KEY, self.assemble(ctx)?)),
            other => Err(StageError::new(self.name(), format!("unknown step '{other}'"))),
        }
    }
}
