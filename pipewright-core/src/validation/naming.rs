//! Naming-convention validator.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::{PipelineConfig, TransportType};
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

lazy_static! {
    /// Pipeline & step names: alphanumeric with interior dashes, at least two
    /// characters, never dotted; dots are the topic-naming delimiter.
    static ref RE_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*[A-Za-z0-9]$").expect("failed to compile RE_NAME regex");
    /// Syntactically legal Kafka topic charset.
    static ref RE_TOPIC: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").expect("failed to compile RE_TOPIC regex");
}

/// Checks pipeline/step names against the platform naming rules and Kafka
/// topic/consumer-group names against the platform conventions.
///
/// A syntactic violation of a name is an error; a well-formed name that
/// merely departs from the convention is a warning.
pub struct NamingConventionValidator;

impl NamingConventionValidator {
    fn check_name(kind: &str, name: &str, errors: &mut Vec<String>) {
        if name.contains('.') {
            errors.push(format!("{} name `{}` must not contain dots, `.` is reserved as the topic-naming delimiter", kind, name));
            return;
        }
        if !RE_NAME.is_match(name) {
            errors.push(format!("{} name `{}` is invalid, must match the pattern `{}`", kind, name, RE_NAME.as_str()));
        }
    }
}

impl PipelineValidator for NamingConventionValidator {
    fn name(&self) -> &'static str {
        "naming-convention"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !config.name.is_empty() {
            Self::check_name("pipeline", &config.name, &mut errors);
        }
        for (step_id, step) in &config.steps {
            Self::check_name("step", &step.step_name, &mut errors);

            // Topic conventions: the topic of an output feeding a step of
            // this pipeline should be `{pipeline}.{target}.input`, with the
            // DLQ at `{pipeline}.{target}.input.dlq`.
            for (output_name, output) in &step.outputs {
                let (Some(target), Some(kafka)) = (output.target_step_name.as_deref(), output.kafka_transport.as_ref()) else {
                    continue;
                };
                if output.transport_type != TransportType::Kafka || !RE_TOPIC.is_match(&kafka.topic) {
                    continue; // Syntactic violations belong to the topic validator.
                }
                let expected = format!("{}.{}.input", config.name, target);
                let expected_dlq = format!("{}.dlq", expected);
                if kafka.topic != expected && kafka.topic != expected_dlq {
                    warnings.push(format!(
                        "step `{}` output `{}` topic `{}` does not follow the `{}` convention",
                        step_id, output_name, kafka.topic, expected
                    ));
                }
            }

            let expected_group = format!("{}.consumer-group", config.name);
            for input in &step.kafka_inputs {
                if let Some(group) = input.consumer_group_id.as_deref() {
                    if group != expected_group {
                        warnings.push(format!(
                            "step `{}` consumer group `{}` does not follow the `{}` convention",
                            step_id, group, expected_group
                        ));
                    }
                }
            }
        }

        ValidationResult::from_parts(errors, warnings)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{OutputTarget, PipelineStepConfig, StepType};

    macro_rules! name_test {
        ($name:ident, $pipeline:literal, $expect_valid:literal) => {
            #[test]
            fn $name() {
                let config = PipelineConfig {
                    name: $pipeline.into(),
                    steps: Default::default(),
                };
                let result = NamingConventionValidator.validate(&config, ValidationMode::Design);
                assert!(
                    $expect_valid == result.valid,
                    "expected valid `{}` for pipeline name `{}`, got errors: {:?}",
                    $expect_valid,
                    $pipeline,
                    result.errors,
                );
            }
        };
    }

    name_test!(plain_name_is_valid, "test-pipeline", true);
    name_test!(digits_are_valid, "pipeline-2", true);
    name_test!(dotted_name_is_an_error, "test.pipeline", false);
    name_test!(leading_dash_is_an_error, "-pipeline", false);
    name_test!(trailing_dash_is_an_error, "pipeline-", false);

    #[test]
    fn off_convention_topic_is_a_warning() {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        step.outputs.insert("default".into(), OutputTarget::kafka("embedder", "some-other-topic"));
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert("chunker".into(), step);

        let result = NamingConventionValidator.validate(&config, ValidationMode::Design);
        assert!(result.valid);
        assert!(
            result.warnings.iter().any(|warning| warning.contains("test-pipeline.embedder.input")),
            "expected a convention warning, got: {:?}",
            result.warnings
        );
    }

    #[test]
    fn conventional_topic_and_dlq_produce_no_warnings() {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        step.outputs.insert(
            "default".into(),
            OutputTarget::kafka("embedder", "test-pipeline.embedder.input"),
        );
        step.outputs.insert(
            "dlq".into(),
            OutputTarget::kafka("embedder", "test-pipeline.embedder.input.dlq"),
        );
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert("chunker".into(), step);

        let result = NamingConventionValidator.validate(&config, ValidationMode::Design);
        assert!(result.valid);
        assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
    }
}
