//! Processor-info validator, production mode only.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::PipelineConfig;
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

const MIN_SERVICE_NAME_LEN: usize = 3;

lazy_static! {
    static ref RE_SERVICE_NAME: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9-._:]*$").expect("failed to compile RE_SERVICE_NAME regex");
    static ref RE_BEAN_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("failed to compile RE_BEAN_NAME regex");
}

/// Checks the processor reference of each step: a remote gRPC service name or
/// an in-process bean name, exactly one of the two.
///
/// Missing processors are the schema validator's concern; this unit only
/// judges processors that are present.
pub struct ProcessorInfoValidator;

impl PipelineValidator for ProcessorInfoValidator {
    fn name(&self) -> &'static str {
        "processor-info"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn modes(&self) -> &'static [ValidationMode] {
        &[ValidationMode::Production]
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for (step_id, step) in &config.steps {
            let Some(processor) = &step.processor_info else { continue };
            match (processor.grpc_service_name.as_deref(), processor.internal_processor_bean_name.as_deref()) {
                (Some(_), Some(_)) => {
                    errors.push(format!(
                        "step `{}` must set exactly one of gRPC service name or internal processor bean name, both are set",
                        step_id
                    ));
                }
                (None, None) => {
                    errors.push(format!(
                        "step `{}` must set exactly one of gRPC service name or internal processor bean name, neither is set",
                        step_id
                    ));
                }
                (Some(service), None) => {
                    if service.len() < MIN_SERVICE_NAME_LEN {
                        errors.push(format!(
                            "step `{}` gRPC service name `{}` is too short, must be at least {} characters",
                            step_id, service, MIN_SERVICE_NAME_LEN
                        ));
                    } else if !RE_SERVICE_NAME.is_match(service) {
                        errors.push(format!(
                            "step `{}` gRPC service name `{}` is invalid, must match the pattern `{}`",
                            step_id,
                            service,
                            RE_SERVICE_NAME.as_str()
                        ));
                    }
                    if service.contains("localhost") || service.contains("127.0.0.1") {
                        warnings.push(format!(
                            "step `{}` gRPC service name `{}` references localhost, which will not resolve in production",
                            step_id, service
                        ));
                    }
                }
                (None, Some(bean)) => {
                    if !RE_BEAN_NAME.is_match(bean) {
                        errors.push(format!(
                            "step `{}` internal processor bean name `{}` is not a valid identifier",
                            step_id, bean
                        ));
                    }
                }
            }
        }
        ValidationResult::from_parts(errors, warnings)
    }
}
