//! Step-reference validator.

use std::collections::HashMap;

use crate::model::{PipelineConfig, TransportType};
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Checks step-name uniqueness across the pipeline and resolves gRPC output
/// targets that are written as bare step references.
///
/// A gRPC service name without a dot is taken to be a reference to a step of
/// the same pipeline rather than a catalog service, and must resolve.
pub struct StepReferenceValidator;

impl PipelineValidator for StepReferenceValidator {
    fn name(&self) -> &'static str {
        "step-reference"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();

        // Step ids are unique by construction of the map; step *names* are
        // not, and duplicates break reference resolution.
        let mut names: HashMap<&str, &str> = HashMap::new();
        for (step_id, step) in &config.steps {
            if let Some(other_id) = names.insert(step.step_name.as_str(), step_id.as_str()) {
                errors.push(format!(
                    "step name `{}` is used by both `{}` and `{}`, step names must be unique per pipeline",
                    step.step_name, other_id, step_id
                ));
            }
        }

        for (step_id, step) in &config.steps {
            for (output_name, output) in &step.outputs {
                if output.transport_type != TransportType::Grpc {
                    continue;
                }
                let Some(grpc) = &output.grpc_transport else { continue };
                let service = grpc.service_name.trim();
                if service.is_empty() || service.contains('.') {
                    continue; // Dotted names are catalog services, not step references.
                }
                let resolves = config.steps.contains_key(service) || names.contains_key(service);
                if !resolves {
                    errors.push(format!(
                        "step `{}` output `{}` references step `{}` which does not exist in pipeline `{}`",
                        step_id, output_name, service, config.name
                    ));
                }
            }
        }

        ValidationResult::from_parts(errors, Vec::new())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{OutputTarget, PipelineStepConfig, StepType};

    #[test]
    fn duplicate_step_names_across_ids_are_errors() {
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert("step-a".into(), PipelineStepConfig::new("worker", StepType::Pipeline));
        config.steps.insert("step-b".into(), PipelineStepConfig::new("worker", StepType::Pipeline));
        let result = StepReferenceValidator.validate(&config, ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("step names must be unique"));
    }

    #[test]
    fn bare_grpc_reference_must_resolve() {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        step.outputs.insert("default".into(), OutputTarget::grpc("missing", "missing"));
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert("chunker".into(), step);
        let result = StepReferenceValidator.validate(&config, ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("references step `missing`"));
    }

    #[test]
    fn dotted_grpc_service_names_are_not_step_references() {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        step.outputs.insert("default".into(), OutputTarget::grpc("sink", "embedder.svc.cluster"));
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert("chunker".into(), step);
        config.steps.insert("sink".into(), PipelineStepConfig::new("sink", StepType::Sink));
        let result = StepReferenceValidator.validate(&config, ValidationMode::Design);
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
    }
}
