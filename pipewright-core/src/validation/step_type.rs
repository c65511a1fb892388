//! Step-type constraint validator.

use crate::model::{PipelineConfig, StepType};
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Enforces the structural constraints of each step class and warns when the
/// pipeline does not have exactly one entry step.
pub struct StepTypeValidator;

impl PipelineValidator for StepTypeValidator {
    fn name(&self) -> &'static str {
        "step-type"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut entry_steps = 0usize;

        for (step_id, step) in &config.steps {
            match step.step_type {
                StepType::InitialPipeline => {
                    entry_steps += 1;
                    if step.outputs.is_empty() {
                        errors.push(format!("INITIAL_PIPELINE step `{}` must have at least one output", step_id));
                    }
                    if !step.kafka_inputs.is_empty() {
                        errors.push(format!("INITIAL_PIPELINE step `{}` must not have Kafka inputs", step_id));
                    }
                }
                StepType::Pipeline => (),
                StepType::Sink => {
                    if !step.outputs.is_empty() {
                        errors.push(format!("SINK steps should not have outputs, step `{}` has {}", step_id, step.outputs.len()));
                    }
                }
            }
        }

        if !config.steps.is_empty() && entry_steps != 1 {
            warnings.push(format!(
                "pipeline `{}` should have exactly one INITIAL_PIPELINE step, found {}",
                config.name, entry_steps
            ));
        }

        ValidationResult::from_parts(errors, warnings)
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{OutputTarget, PipelineStepConfig};

    fn pipeline(steps: Vec<PipelineStepConfig>) -> PipelineConfig {
        let mut map = BTreeMap::new();
        for step in steps {
            map.insert(step.step_name.clone(), step);
        }
        PipelineConfig {
            name: "test-pipeline".into(),
            steps: map,
        }
    }

    #[test]
    fn sink_with_output_is_an_error() {
        let mut sink = PipelineStepConfig::new("writer", StepType::Sink);
        sink.outputs.insert("default".into(), OutputTarget::kafka("writer", "test-pipeline.writer.input"));
        let result = StepTypeValidator.validate(&pipeline(vec![sink]), ValidationMode::Design);
        assert!(!result.valid);
        assert!(
            result.errors.iter().any(|error| error.contains("SINK steps should not have outputs")),
            "unexpected errors: {:?}",
            result.errors
        );
    }

    #[test]
    fn entry_step_without_outputs_is_an_error() {
        let entry = PipelineStepConfig::new("entry", StepType::InitialPipeline);
        let result = StepTypeValidator.validate(&pipeline(vec![entry]), ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("must have at least one output"));
    }

    #[test]
    fn entry_step_with_kafka_inputs_is_an_error() {
        let mut entry = PipelineStepConfig::new("entry", StepType::InitialPipeline);
        entry.outputs.insert("default".into(), OutputTarget::kafka("next", "test-pipeline.next.input"));
        entry.kafka_inputs.push(crate::model::KafkaInputDefinition {
            listen_topics: vec!["loopback".into()],
            consumer_group_id: None,
            kafka_consumer_properties: Default::default(),
        });
        let result = StepTypeValidator.validate(&pipeline(vec![entry]), ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("must not have Kafka inputs"));
    }

    #[test]
    fn zero_or_many_entry_steps_is_a_warning_not_an_error() {
        let interior = PipelineStepConfig::new("middle", StepType::Pipeline);
        let result = StepTypeValidator.validate(&pipeline(vec![interior]), ValidationMode::Design);
        assert!(result.valid);
        assert!(result.warnings[0].contains("exactly one INITIAL_PIPELINE"));

        let mut entry_a = PipelineStepConfig::new("entry-a", StepType::InitialPipeline);
        entry_a.outputs.insert("default".into(), OutputTarget::kafka("entry-b", "test-pipeline.entry-b.input"));
        let mut entry_b = PipelineStepConfig::new("entry-b", StepType::InitialPipeline);
        entry_b.outputs.insert("default".into(), OutputTarget::kafka("entry-a", "test-pipeline.entry-a.input"));
        let result = StepTypeValidator.validate(&pipeline(vec![entry_a, entry_b]), ValidationMode::Design);
        assert!(result.valid);
        assert!(result.warnings[0].contains("found 2"));
    }

    #[test]
    fn empty_pipeline_produces_no_entry_warning() {
        let result = StepTypeValidator.validate(&pipeline(vec![]), ValidationMode::Design);
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }
}
