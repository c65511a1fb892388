//! Required-fields validator.

use crate::model::PipelineConfig;
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Backoffs above this are suspicious enough to warn about.
const BACKOFF_WARN_MS: u64 = 60_000;
/// Step timeouts above this are suspicious enough to warn about.
const TIMEOUT_WARN_MS: u64 = 300_000;

/// Checks per-step field presence and numeric sanity of the retry/backoff and
/// timeout settings.
pub struct RequiredFieldsValidator;

impl PipelineValidator for RequiredFieldsValidator {
    fn name(&self) -> &'static str {
        "required-fields"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for (step_id, step) in &config.steps {
            if step.description.as_deref().map_or(true, str::is_empty) {
                warnings.push(format!("step `{}` should have a description", step_id));
            }
            if step.retry_backoff_ms > step.max_retry_backoff_ms {
                errors.push(format!(
                    "step `{}` retry backoff {}ms exceeds its max retry backoff {}ms",
                    step_id, step.retry_backoff_ms, step.max_retry_backoff_ms
                ));
            }
            if step.retry_backoff_ms > BACKOFF_WARN_MS {
                warnings.push(format!(
                    "step `{}` retry backoff {}ms is unusually high (> {}ms)",
                    step_id, step.retry_backoff_ms, BACKOFF_WARN_MS
                ));
            }
            if step.step_timeout_ms > TIMEOUT_WARN_MS {
                warnings.push(format!(
                    "step `{}` timeout {}ms is unusually high (> {}ms)",
                    step_id, step.step_timeout_ms, TIMEOUT_WARN_MS
                ));
            }
        }
        ValidationResult::from_parts(errors, warnings)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{PipelineStepConfig, StepType};

    fn pipeline_with_step(step: PipelineStepConfig) -> PipelineConfig {
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert(step.step_name.clone(), step);
        config
    }

    #[test]
    fn missing_description_is_a_warning_only() {
        let step = PipelineStepConfig::new("chunker", StepType::Pipeline);
        let result = RequiredFieldsValidator.validate(&pipeline_with_step(step), ValidationMode::Production);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|warning| warning.contains("description")));
    }

    #[test]
    fn initial_backoff_above_max_backoff_is_an_error() {
        let mut step = PipelineStepConfig::new("chunker", StepType::Pipeline);
        step.retry_backoff_ms = 60_000;
        step.max_retry_backoff_ms = 30_000;
        let result = RequiredFieldsValidator.validate(&pipeline_with_step(step), ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("exceeds its max retry backoff"));
    }

    #[test]
    fn high_backoff_and_timeout_are_warnings() {
        let mut step = PipelineStepConfig::new("chunker", StepType::Pipeline);
        step.description = Some("test".into());
        step.retry_backoff_ms = 61_000;
        step.max_retry_backoff_ms = 120_000;
        step.step_timeout_ms = 600_000;
        let result = RequiredFieldsValidator.validate(&pipeline_with_step(step), ValidationMode::Design);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 2, "unexpected warnings: {:?}", result.warnings);
    }
}
