//! Output-routing validator.

use std::collections::HashSet;

use crate::model::{PipelineConfig, TransportType};
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Checks that every output resolves: in-pipeline targets must name existing
/// steps, transport config must be present for the selected transport, and
/// output names must be unique per step regardless of case.
pub struct OutputRoutingValidator;

impl PipelineValidator for OutputRoutingValidator {
    fn name(&self) -> &'static str {
        "output-routing"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        for (step_id, step) in &config.steps {
            let mut seen_names: HashSet<String> = HashSet::new();
            for (output_name, output) in &step.outputs {
                if !seen_names.insert(output_name.to_ascii_lowercase()) {
                    errors.push(format!(
                        "step `{}` output `{}` duplicates another output name, output names are case-insensitive",
                        step_id, output_name
                    ));
                }
                if let Some(target) = output.target_step_name.as_deref() {
                    if !config.steps.contains_key(target) {
                        errors.push(format!(
                            "step `{}` output `{}` targets step `{}` which does not exist in pipeline `{}`",
                            step_id, output_name, target, config.name
                        ));
                    }
                }
                match output.transport_type {
                    TransportType::Kafka => match &output.kafka_transport {
                        Some(kafka) if !kafka.topic.trim().is_empty() => (),
                        Some(_) => errors.push(format!("step `{}` output `{}` has a blank Kafka topic", step_id, output_name)),
                        None => errors.push(format!(
                            "step `{}` output `{}` uses the KAFKA transport but has no Kafka transport config",
                            step_id, output_name
                        )),
                    },
                    TransportType::Grpc => match &output.grpc_transport {
                        Some(grpc) if !grpc.service_name.trim().is_empty() => (),
                        Some(_) => errors.push(format!("step `{}` output `{}` has a blank gRPC service name", step_id, output_name)),
                        None => errors.push(format!(
                            "step `{}` output `{}` uses the GRPC transport but has no gRPC transport config",
                            step_id, output_name
                        )),
                    },
                }
            }
        }
        ValidationResult::from_parts(errors, Vec::new())
    }
}
