//! Structural schema validator, mode-graduated.

use crate::model::{PipelineConfig, StepType};
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Severity of a structural finding under a given mode.
enum Severity {
    Warn,
    Error,
}

/// Checks the structural completeness of the pipeline, with strictness
/// graduated by mode: DESIGN keeps in-progress pipelines workable by
/// reporting most missing pieces as warnings, TESTING hardens the identity
/// fields, and PRODUCTION treats everything as a hard error and additionally
/// requires an entry step.
pub struct SchemaValidator;

impl SchemaValidator {
    fn push(severity: Severity, message: String, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        match severity {
            Severity::Warn => warnings.push(message),
            Severity::Error => errors.push(message),
        }
    }
}

impl PipelineValidator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn priority(&self) -> u32 {
        90
    }

    fn validate(&self, config: &PipelineConfig, mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.name.trim().is_empty() {
            let severity = match mode {
                ValidationMode::Design => Severity::Warn,
                ValidationMode::Testing | ValidationMode::Production => Severity::Error,
            };
            Self::push(severity, "pipeline has no name".into(), &mut errors, &mut warnings);
        }

        if config.steps.is_empty() {
            let severity = match mode {
                ValidationMode::Design | ValidationMode::Testing => Severity::Warn,
                ValidationMode::Production => Severity::Error,
            };
            Self::push(
                severity,
                format!("pipeline `{}` has no steps defined", config.name),
                &mut errors,
                &mut warnings,
            );
        }

        for (step_id, step) in &config.steps {
            if step.processor_info.is_none() {
                let severity = match mode {
                    ValidationMode::Design => Severity::Warn,
                    ValidationMode::Testing | ValidationMode::Production => Severity::Error,
                };
                Self::push(severity, format!("step `{}` has no processor", step_id), &mut errors, &mut warnings);
            }
            if step.step_type != StepType::Sink && step.outputs.is_empty() {
                let severity = match mode {
                    ValidationMode::Design | ValidationMode::Testing => Severity::Warn,
                    ValidationMode::Production => Severity::Error,
                };
                Self::push(severity, format!("step `{}` has no outputs", step_id), &mut errors, &mut warnings);
            }
        }

        if mode == ValidationMode::Production
            && !config.steps.is_empty()
            && !config.steps.values().any(|step| step.step_type == StepType::InitialPipeline)
        {
            errors.push(format!("pipeline `{}` must have at least one INITIAL_PIPELINE step", config.name));
        }

        ValidationResult::from_parts(errors, warnings)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{PipelineStepConfig, ProcessorInfo};

    fn empty_pipeline() -> PipelineConfig {
        PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        }
    }

    #[test]
    fn empty_pipeline_is_a_warning_outside_production() {
        for mode in [ValidationMode::Design, ValidationMode::Testing] {
            let result = SchemaValidator.validate(&empty_pipeline(), mode);
            assert!(result.valid, "unexpected errors in {}: {:?}", mode, result.errors);
            assert!(result.warnings.iter().any(|warning| warning.contains("no steps")));
        }
    }

    #[test]
    fn empty_pipeline_is_an_error_in_production() {
        let result = SchemaValidator.validate(&empty_pipeline(), ValidationMode::Production);
        assert!(!result.valid);
        assert!(result.errors[0].contains("no steps"));
    }

    #[test]
    fn unnamed_pipeline_hardens_from_testing_up() {
        let mut config = empty_pipeline();
        config.name = "".into();
        assert!(SchemaValidator.validate(&config, ValidationMode::Design).valid);
        assert!(!SchemaValidator.validate(&config, ValidationMode::Testing).valid);
        assert!(!SchemaValidator.validate(&config, ValidationMode::Production).valid);
    }

    #[test]
    fn missing_processor_hardens_from_testing_up() {
        let mut config = empty_pipeline();
        config.steps.insert("chunker".into(), PipelineStepConfig::new("chunker", StepType::InitialPipeline));
        let design = SchemaValidator.validate(&config, ValidationMode::Design);
        assert!(design.valid);
        assert!(design.warnings.iter().any(|warning| warning.contains("no processor")));
        assert!(!SchemaValidator.validate(&config, ValidationMode::Testing).valid);
    }

    #[test]
    fn production_requires_an_entry_step() {
        let mut config = empty_pipeline();
        let mut sink = PipelineStepConfig::new("writer", StepType::Sink);
        sink.processor_info = Some(ProcessorInfo::grpc("writer-module"));
        config.steps.insert("writer".into(), sink);
        let result = SchemaValidator.validate(&config, ValidationMode::Production);
        assert!(!result.valid);
        assert!(
            result.errors.iter().any(|error| error.contains("at least one INITIAL_PIPELINE")),
            "unexpected errors: {:?}",
            result.errors
        );
    }
}
