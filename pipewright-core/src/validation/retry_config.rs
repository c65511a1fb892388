//! Retry & transport-config bounds validator.

use crate::model::PipelineConfig;
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

const RETRIES_WARN: u32 = 10;
const RETRIES_ERROR: u32 = 100;
const BACKOFF_WARN_MS: u64 = 300_000; // 5 minutes
const BACKOFF_ERROR_MS: u64 = 3_600_000; // 1 hour
const TIMEOUT_WARN_MS: u64 = 600_000; // 10 minutes
const TIMEOUT_ERROR_MS: u64 = 3_600_000; // 1 hour
const LINGER_WARN_MS: u32 = 30_000;

/// Compression codecs accepted by the brokers this platform deploys against.
const COMPRESSION_TYPES: [&str; 5] = ["none", "gzip", "snappy", "lz4", "zstd"];

/// Bounds-checks retry/backoff/timeout settings and the raw Kafka/gRPC
/// transport properties.
pub struct RetryConfigValidator;

impl PipelineValidator for RetryConfigValidator {
    fn name(&self) -> &'static str {
        "retry-config"
    }

    fn priority(&self) -> u32 {
        70
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for (step_id, step) in &config.steps {
            if step.max_retries > RETRIES_ERROR {
                errors.push(format!("step `{}` max retries {} exceeds the limit of {}", step_id, step.max_retries, RETRIES_ERROR));
            } else if step.max_retries > RETRIES_WARN {
                warnings.push(format!("step `{}` max retries {} is unusually high (> {})", step_id, step.max_retries, RETRIES_WARN));
            }

            if step.max_retry_backoff_ms > BACKOFF_ERROR_MS {
                errors.push(format!(
                    "step `{}` max retry backoff {}ms exceeds the limit of {}ms",
                    step_id, step.max_retry_backoff_ms, BACKOFF_ERROR_MS
                ));
            } else if step.max_retry_backoff_ms > BACKOFF_WARN_MS {
                warnings.push(format!(
                    "step `{}` max retry backoff {}ms is unusually high (> {}ms)",
                    step_id, step.max_retry_backoff_ms, BACKOFF_WARN_MS
                ));
            }

            if step.step_timeout_ms > TIMEOUT_ERROR_MS {
                errors.push(format!("step `{}` timeout {}ms exceeds the limit of {}ms", step_id, step.step_timeout_ms, TIMEOUT_ERROR_MS));
            } else if step.step_timeout_ms > TIMEOUT_WARN_MS {
                warnings.push(format!("step `{}` timeout {}ms is unusually high (> {}ms)", step_id, step.step_timeout_ms, TIMEOUT_WARN_MS));
            }

            for (output_name, output) in &step.outputs {
                if let Some(kafka) = &output.kafka_transport {
                    if kafka.batch_size == 0 {
                        errors.push(format!("step `{}` output `{}` Kafka batch size must be positive", step_id, output_name));
                    }
                    if kafka.linger_ms > LINGER_WARN_MS {
                        warnings.push(format!(
                            "step `{}` output `{}` Kafka linger {}ms is unusually high (> {}ms)",
                            step_id, output_name, kafka.linger_ms, LINGER_WARN_MS
                        ));
                    }
                    if !COMPRESSION_TYPES.contains(&kafka.compression_type.as_str()) {
                        errors.push(format!(
                            "step `{}` output `{}` Kafka compression type `{}` is not one of {:?}",
                            step_id, output_name, kafka.compression_type, COMPRESSION_TYPES
                        ));
                    }
                }
                if let Some(grpc) = &output.grpc_transport {
                    if let Some(timeout) = grpc.grpc_client_properties.get("timeout") {
                        if timeout.parse::<u64>().is_err() {
                            errors.push(format!(
                                "step `{}` output `{}` gRPC `timeout` property `{}` is not a number of milliseconds",
                                step_id, output_name, timeout
                            ));
                        }
                    }
                    if let Some(retry) = grpc.grpc_client_properties.get("retry") {
                        if retry.parse::<u32>().is_err() {
                            errors.push(format!(
                                "step `{}` output `{}` gRPC `retry` property `{}` is not a number of attempts",
                                step_id, output_name, retry
                            ));
                        }
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

    fn pipeline_with_step(step: PipelineStepConfig) -> PipelineConfig {
        let mut config = PipelineConfig {
            name: "test-pipeline".into(),
            steps: Default::default(),
        };
        config.steps.insert(step.step_name.clone(), step);
        config
    }

    #[test]
    fn retry_count_bounds() {
        let mut step = PipelineStepConfig::new("chunker", StepType::Pipeline);
        step.max_retries = 11;
        let result = RetryConfigValidator.validate(&pipeline_with_step(step.clone()), ValidationMode::Design);
        assert!(result.valid);
        assert!(result.warnings[0].contains("max retries 11"));

        step.max_retries = 101;
        let result = RetryConfigValidator.validate(&pipeline_with_step(step), ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("exceeds the limit of 100"));
    }

    #[test]
    fn backoff_and_timeout_bounds() {
        let mut step = PipelineStepConfig::new("chunker", StepType::Pipeline);
        step.max_retry_backoff_ms = 3_600_001;
        step.step_timeout_ms = 3_600_001;
        let result = RetryConfigValidator.validate(&pipeline_with_step(step), ValidationMode::Design);
        assert_eq!(result.errors.len(), 2, "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn invalid_compression_type_is_an_error() {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        let mut output = OutputTarget::kafka("chunker", "test-pipeline.chunker.input");
        output.kafka_transport.as_mut().unwrap().compression_type = "brotli".into();
        step.outputs.insert("default".into(), output);
        let result = RetryConfigValidator.validate(&pipeline_with_step(step), ValidationMode::Design);
        assert!(!result.valid);
        assert!(result.errors[0].contains("compression type `brotli`"));
    }

    #[test]
    fn unparsable_grpc_properties_are_errors() {
        let mut step = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
        let mut output = OutputTarget::grpc("chunker", "embedder-module");
        let properties = &mut output.grpc_transport.as_mut().unwrap().grpc_client_properties;
        properties.insert("timeout".into(), "soon".into());
        properties.insert("retry".into(), "-1".into());
        step.outputs.insert("default".into(), output);
        let result = RetryConfigValidator.validate(&pipeline_with_step(step), ValidationMode::Design);
        assert_eq!(result.errors.len(), 2, "unexpected errors: {:?}", result.errors);
    }
}
