//! The validation pipeline engine.
//!
//! An ordered chain of independent validator units, each examining one
//! `PipelineConfig` and returning structured errors & warnings. Validation is
//! pure: identical input and mode always yields an identical result, so the
//! engine may be called concurrently by any number of writers.
//!
//! All applicable validators always run (the engine never aborts early) so
//! a caller sees the full error/warning set in one pass. Warnings never
//! affect validity.

mod kafka_topic;
mod loops;
mod naming;
mod output_routing;
mod processor_info;
mod required_fields;
mod retry_config;
mod schema;
mod step_reference;
mod step_type;

use serde::{Deserialize, Serialize};

use crate::model::PipelineConfig;

pub use kafka_topic::KafkaTopicValidator;
pub use loops::{InterPipelineLoopValidator, IntraPipelineLoopValidator};
pub use naming::NamingConventionValidator;
pub use output_routing::OutputRoutingValidator;
pub use processor_info::ProcessorInfoValidator;
pub use required_fields::RequiredFieldsValidator;
pub use retry_config::RetryConfigValidator;
pub use schema::SchemaValidator;
pub use step_reference::StepReferenceValidator;
pub use step_type::StepTypeValidator;

/// The strictness level a validation pass runs at.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    /// Lenient, for in-progress pipelines.
    Design,
    /// Intermediate strictness.
    Testing,
    /// Strict, pre-deployment.
    Production,
}

impl ValidationMode {
    /// All modes, in increasing strictness.
    pub const ALL: [ValidationMode; 3] = [Self::Design, Self::Testing, Self::Production];
}

impl std::fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Design => write!(f, "DESIGN"),
            Self::Testing => write!(f, "TESTING"),
            Self::Production => write!(f, "PRODUCTION"),
        }
    }
}

/// The outcome of a validation pass.
///
/// A pure value: composed by appending lists, never mutated after
/// construction.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the examined object may be committed.
    pub valid: bool,
    /// Rule violations blocking a commit.
    pub errors: Vec<String>,
    /// Advisories which never affect validity.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A passing result with no diagnostics.
    pub fn success() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }

    /// A failing result carrying a single error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self::from_parts(vec![error.into()], Vec::new())
    }

    /// A passing result carrying a single warning.
    pub fn warning(warning: impl Into<String>) -> Self {
        Self::from_parts(Vec::new(), vec![warning.into()])
    }

    /// Build a result from accumulated diagnostics; validity is derived.
    pub fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::success()
    }
}

/// A single validator unit of the engine.
///
/// Implementations are stateless and independently testable. A validator
/// which cannot evaluate its input returns a failing result rather than
/// panicking or erroring out of band.
pub trait PipelineValidator: Send + Sync {
    /// The display name of this validator.
    fn name(&self) -> &'static str;

    /// Ordering priority; lower priorities contribute their diagnostics
    /// earlier in the combined result.
    fn priority(&self) -> u32;

    /// The modes this validator participates in. Defaults to all three.
    fn modes(&self) -> &'static [ValidationMode] {
        &ValidationMode::ALL
    }

    /// Validate the given config under the given mode.
    fn validate(&self, config: &PipelineConfig, mode: ValidationMode) -> ValidationResult;
}

/// The ordered validator chain.
///
/// Built once at startup from a static table; nothing depends on runtime
/// mutation of the list.
pub struct ValidationEngine {
    validators: Vec<Box<dyn PipelineValidator>>,
}

impl ValidationEngine {
    /// Create an engine with the full standard validator chain.
    pub fn new() -> Self {
        Self::with_validators(vec![
            Box::new(RequiredFieldsValidator),
            Box::new(NamingConventionValidator),
            Box::new(KafkaTopicValidator),
            Box::new(StepTypeValidator),
            Box::new(OutputRoutingValidator),
            Box::new(StepReferenceValidator),
            Box::new(RetryConfigValidator),
            Box::new(ProcessorInfoValidator),
            Box::new(SchemaValidator),
            Box::new(IntraPipelineLoopValidator),
            Box::new(InterPipelineLoopValidator),
        ])
    }

    /// Create an engine from the given units, ordered by priority.
    pub fn with_validators(mut validators: Vec<Box<dyn PipelineValidator>>) -> Self {
        validators.sort_by_key(|validator| validator.priority());
        Self { validators }
    }

    /// Validate the given config under the given mode.
    ///
    /// Every validator participating in `mode` runs; diagnostics are
    /// concatenated in priority order.
    pub fn validate(&self, config: &PipelineConfig, mode: ValidationMode) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for validator in self.validators.iter().filter(|validator| validator.modes().contains(&mode)) {
            let result = validator.validate(config, mode);
            tracing::debug!(
                validator = validator.name(),
                %mode,
                errors = result.errors.len(),
                warnings = result.warnings.len(),
                "validator executed",
            );
            errors.extend(result.errors);
            warnings.extend(result.warnings);
        }
        ValidationResult::from_parts(errors, warnings)
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}
