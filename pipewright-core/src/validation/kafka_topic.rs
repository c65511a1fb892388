//! Kafka topic-name validator.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::PipelineConfig;
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Kafka's hard limit on topic name length.
const MAX_TOPIC_LEN: usize = 249;

lazy_static! {
    static ref RE_TOPIC: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").expect("failed to compile RE_TOPIC regex");
}

/// Checks every referenced Kafka topic against the broker's own naming rules.
pub struct KafkaTopicValidator;

impl KafkaTopicValidator {
    fn check_topic(context: &str, topic: &str, errors: &mut Vec<String>) {
        if topic == "." || topic == ".." {
            errors.push(format!("{} topic `{}` is reserved and may not be used", context, topic));
            return;
        }
        if topic.len() > MAX_TOPIC_LEN {
            errors.push(format!("{} topic `{}` exceeds the maximum length of {} characters", context, topic, MAX_TOPIC_LEN));
        }
        if !RE_TOPIC.is_match(topic) {
            errors.push(format!(
                "{} topic `{}` is invalid, must match the pattern `{}`",
                context,
                topic,
                RE_TOPIC.as_str()
            ));
        }
    }
}

impl PipelineValidator for KafkaTopicValidator {
    fn name(&self) -> &'static str {
        "kafka-topic"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        for (step_id, step) in &config.steps {
            for (output_name, output) in &step.outputs {
                if let Some(kafka) = &output.kafka_transport {
                    let context = format!("step `{}` output `{}`", step_id, output_name);
                    Self::check_topic(&context, &kafka.topic, &mut errors);
                }
            }
            for input in &step.kafka_inputs {
                for topic in &input.listen_topics {
                    let context = format!("step `{}` input", step_id);
                    Self::check_topic(&context, topic, &mut errors);
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

    fn pipeline_with_topic(topic: &str) -> PipelineConfig {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        step.outputs.insert("default".into(), OutputTarget::kafka("embedder", topic));
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert("chunker".into(), step);
        config
    }

    macro_rules! topic_test {
        ($name:ident, $topic:expr, $expect_valid:literal) => {
            #[test]
            fn $name() {
                let result = KafkaTopicValidator.validate(&pipeline_with_topic(&$topic), ValidationMode::Design);
                assert!(
                    $expect_valid == result.valid,
                    "expected valid `{}` for topic `{}`, got errors: {:?}",
                    $expect_valid,
                    $topic,
                    result.errors,
                );
            }
        };
    }

    topic_test!(conventional_topic_is_valid, "test-pipeline.embedder.input", true);
    topic_test!(underscores_are_valid, "internal_topic", true);
    topic_test!(max_length_topic_is_valid, "a".repeat(249), true);
    topic_test!(over_length_topic_is_an_error, "a".repeat(250), false);
    topic_test!(dot_topic_is_an_error, ".", false);
    topic_test!(dot_dot_topic_is_an_error, "..", false);
    topic_test!(illegal_charset_is_an_error, "topic with spaces", false);
}
