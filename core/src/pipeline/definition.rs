use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::error::PipelineError;
use crate::stage::{Stage, StageContext, StepSpec};
use crate::task::{StatusTransition, TaskStatus};

/// Context key a stage writes the final result under.
pub const RESULT_KEY: &str = "result";

/// Allowed distance between the summed step weights and 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// A step as scheduled by a pipeline, with the stage that owns it.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub stage_index: usize,
    pub phase: TaskStatus,
    pub step: StepSpec,
}

/// A fixed, ordered list of stages whose step weights sum to 1.0.
pub struct PipelineDefinition {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    plan: Vec<PlannedStep>,
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("plan", &self.plan)
            .finish()
    }
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, stages: Vec<Arc<dyn Stage>>) -> Result<Self, PipelineError> {
        let name = name.into();
        let mut plan = Vec::new();
        let mut labels = HashSet::new();
        let mut last_phase = TaskStatus::Pending;

        for (stage_index, stage) in stages.iter().enumerate() {
            let phase = stage.phase();
            if !StatusTransition::is_stage_phase(phase) {
                return Err(PipelineError::InvalidPhase(stage.name().to_string()));
            }
            if StatusTransition::rank(phase) < StatusTransition::rank(last_phase) {
                return Err(PipelineError::PhaseOrder {
                    stage: stage.name().to_string(),
                    phase: phase.to_string(),
                });
            }
            last_phase = phase;

            for step in stage.steps() {
                if !step.weight.is_finite() || step.weight <= 0.0 {
                    return Err(PipelineError::InvalidWeight {
                        label: step.label,
                        weight: step.weight,
                    });
                }
                if !labels.insert(step.label.clone()) {
                    return Err(PipelineError::DuplicateStep(step.label));
                }
                plan.push(PlannedStep {
                    stage_index,
                    phase,
                    step,
                });
            }
        }

        if plan.is_empty() {
            return Err(PipelineError::Empty(name));
        }

        let sum: f64 = plan.iter().map(|p| p.step.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PipelineError::WeightSum {
                pipeline: name,
                sum,
            });
        }

        Ok(Self { name, stages, plan })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> &[PlannedStep] {
        &self.plan
    }

    pub fn stage(&self, index: usize) -> Option<&Arc<dyn Stage>> {
        self.stages.get(index)
    }

    /// The value under [`RESULT_KEY`] if a stage produced one, otherwise the
    /// whole accumulated context.
    pub fn assemble_result(&self, ctx: &StageContext) -> Value {
        match ctx.get(RESULT_KEY) {
            Some(v) if !v.is_null() => v.clone(),
            _ => Value::Object(ctx.data().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::stage::StageOutput;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        phase: TaskStatus,
        steps: Vec<(&'static str, f64)>,
    }

    #[async_trait]
    impl Stage for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn phase(&self) -> TaskStatus {
            self.phase
        }

        fn steps(&self) -> Vec<StepSpec> {
            self.steps
                .iter()
                .map(|(l, w)| StepSpec::new(*l, *w))
                .collect()
        }

        async fn execute(
            &self,
            _step: &StepSpec,
            _ctx: &StageContext,
        ) -> Result<StageOutput, StageError> {
            Ok(StageOutput::default())
        }
    }

    fn stage(
        name: &'static str,
        phase: TaskStatus,
        steps: Vec<(&'static str, f64)>,
    ) -> Arc<dyn Stage> {
        Arc::new(Fixed { name, phase, steps })
    }

    #[test]
    fn accepts_weights_summing_to_one() {
        let p = PipelineDefinition::new(
            "content",
            vec![
                stage("analysis", TaskStatus::Analyzing, vec![("analyze", 0.2)]),
                stage(
                    "content",
                    TaskStatus::Generating,
                    vec![("world", 0.25), ("characters", 0.2), ("narrative", 0.2)],
                ),
                stage(
                    "validation",
                    TaskStatus::Validating,
                    vec![("validate", 0.1), ("assemble", 0.05)],
                ),
            ],
        )
        .unwrap();
        assert_eq!(p.plan().len(), 6);
        assert_eq!(p.plan()[3].stage_index, 1);
        assert_eq!(p.plan()[3].phase, TaskStatus::Generating);
    }

    #[test]
    fn rejects_bad_weight_sum() {
        let err = PipelineDefinition::new(
            "short",
            vec![stage("a", TaskStatus::Analyzing, vec![("a", 0.5)])],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::WeightSum { .. }));
    }

    #[test]
    fn rejects_empty_and_non_positive() {
        assert!(matches!(
            PipelineDefinition::new("none", vec![]).unwrap_err(),
            PipelineError::Empty(_)
        ));
        assert!(matches!(
            PipelineDefinition::new(
                "neg",
                vec![stage(
                    "a",
                    TaskStatus::Analyzing,
                    vec![("a", 1.5), ("b", -0.5)]
                )]
            )
            .unwrap_err(),
            PipelineError::InvalidWeight { .. }
        ));
    }

    #[test]
    fn rejects_duplicate_labels_and_backward_phases() {
        assert!(matches!(
            PipelineDefinition::new(
                "dup",
                vec![stage(
                    "a",
                    TaskStatus::Analyzing,
                    vec![("x", 0.5), ("x", 0.5)]
                )]
            )
            .unwrap_err(),
            PipelineError::DuplicateStep(_)
        ));
        assert!(matches!(
            PipelineDefinition::new(
                "order",
                vec![
                    stage("g", TaskStatus::Generating, vec![("g", 0.5)]),
                    stage("a", TaskStatus::Analyzing, vec![("a", 0.5)]),
                ]
            )
            .unwrap_err(),
            PipelineError::PhaseOrder { .. }
        ));
        assert!(matches!(
            PipelineDefinition::new(
                "terminal",
                vec![stage("c", TaskStatus::Completed, vec![("c", 1.0)])]
            )
            .unwrap_err(),
            PipelineError::InvalidPhase(_)
        ));
    }
}
