//! Pipeline configuration model.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The definition of a pipeline: a named set of steps wired together through
/// their output targets.
///
/// A pipeline with zero steps is a valid transient state, used while the
/// modules it will reference are still being whitelisted.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// The name of this pipeline, unique within a cluster.
    pub name: String,
    /// The steps of this pipeline, keyed by step id.
    #[serde(default)]
    pub steps: BTreeMap<String, PipelineStepConfig>,
}

/// The definition of a single pipeline step.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStepConfig {
    /// The name of this step, unique per pipeline.
    pub step_name: String,
    /// The class of this step within the pipeline graph.
    pub step_type: StepType,
    /// Operator-facing description of what this step does.
    #[serde(default)]
    pub description: Option<String>,
    /// The processor which executes this step.
    #[serde(default)]
    pub processor_info: Option<ProcessorInfo>,
    /// Named output routes of this step.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputTarget>,
    /// Kafka inputs feeding this step, if any.
    #[serde(default)]
    pub kafka_inputs: Vec<KafkaInputDefinition>,
    /// The maximum number of retries for a failed execution of this step.
    #[serde(default = "PipelineStepConfig::default_max_retries")]
    pub max_retries: u32,
    /// The initial backoff between retries, in milliseconds.
    #[serde(default = "PipelineStepConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// The cap applied to the retry backoff, in milliseconds.
    #[serde(default = "PipelineStepConfig::default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
    /// The multiplier applied to the backoff after each failed attempt.
    #[serde(default = "PipelineStepConfig::default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
    /// The per-execution timeout of this step, in milliseconds.
    #[serde(default = "PipelineStepConfig::default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

impl PipelineStepConfig {
    /// Create a minimal step of the given type.
    pub fn new(step_name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            step_name: step_name.into(),
            step_type,
            description: None,
            processor_info: None,
            outputs: Default::default(),
            kafka_inputs: Default::default(),
            max_retries: Self::default_max_retries(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
            max_retry_backoff_ms: Self::default_max_retry_backoff_ms(),
            retry_backoff_multiplier: Self::default_retry_backoff_multiplier(),
            step_timeout_ms: Self::default_step_timeout_ms(),
        }
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_retry_backoff_ms() -> u64 {
        1_000
    }

    fn default_max_retry_backoff_ms() -> u64 {
        30_000
    }

    fn default_retry_backoff_multiplier() -> f64 {
        2.0
    }

    fn default_step_timeout_ms() -> u64 {
        10_000
    }
}

/// The class of a pipeline step.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// An entry step, fed directly by the pipeline trigger.
    InitialPipeline,
    /// An interior step, fed by other steps.
    Pipeline,
    /// A terminal step with no outputs.
    Sink,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitialPipeline => write!(f, "INITIAL_PIPELINE"),
            Self::Pipeline => write!(f, "PIPELINE"),
            Self::Sink => write!(f, "SINK"),
        }
    }
}

/// The processor executing a step: either a remote gRPC module or an
/// in-process processor. Exactly one of the two must be set for a step to be
/// valid in production mode.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorInfo {
    /// The service name of the remote gRPC module executing this step.
    #[serde(default)]
    pub grpc_service_name: Option<String>,
    /// The bean name of the in-process processor executing this step.
    #[serde(default)]
    pub internal_processor_bean_name: Option<String>,
}

impl ProcessorInfo {
    /// A processor pointing at a remote gRPC module.
    pub fn grpc(service_name: impl Into<String>) -> Self {
        Self {
            grpc_service_name: Some(service_name.into()),
            internal_processor_bean_name: None,
        }
    }

    /// A processor pointing at an in-process bean.
    pub fn internal(bean_name: impl Into<String>) -> Self {
        Self {
            grpc_service_name: None,
            internal_processor_bean_name: Some(bean_name.into()),
        }
    }
}

/// The transport used by an output route.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    Kafka,
    Grpc,
}

/// A single output route of a step.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputTarget {
    /// The step within the same pipeline this output feeds, if any.
    #[serde(default)]
    pub target_step_name: Option<String>,
    /// The transport carrying this output.
    pub transport_type: TransportType,
    /// Kafka transport config, required when `transport_type` is KAFKA.
    #[serde(default)]
    pub kafka_transport: Option<KafkaTransportConfig>,
    /// gRPC transport config, required when `transport_type` is GRPC.
    #[serde(default)]
    pub grpc_transport: Option<GrpcTransportConfig>,
}

impl OutputTarget {
    /// A Kafka output to the given topic, targeting the given step.
    pub fn kafka(target_step_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            target_step_name: Some(target_step_name.into()),
            transport_type: TransportType::Kafka,
            kafka_transport: Some(KafkaTransportConfig::new(topic)),
            grpc_transport: None,
        }
    }

    /// A gRPC output to the given service, targeting the given step.
    pub fn grpc(target_step_name: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            target_step_name: Some(target_step_name.into()),
            transport_type: TransportType::Grpc,
            kafka_transport: None,
            grpc_transport: Some(GrpcTransportConfig {
                service_name: service_name.into(),
                grpc_client_properties: Default::default(),
            }),
        }
    }
}

/// Kafka producer configuration of an output route.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTransportConfig {
    /// The topic this output publishes to.
    pub topic: String,
    /// The document field used to derive the partition key.
    #[serde(default)]
    pub partition_key_field: Option<String>,
    /// Producer batch size in bytes.
    #[serde(default = "KafkaTransportConfig::default_batch_size")]
    pub batch_size: u32,
    /// Producer linger in milliseconds.
    #[serde(default = "KafkaTransportConfig::default_linger_ms")]
    pub linger_ms: u32,
    /// Producer compression codec.
    #[serde(default = "KafkaTransportConfig::default_compression_type")]
    pub compression_type: String,
    /// Additional raw producer properties.
    #[serde(default)]
    pub kafka_producer_properties: BTreeMap<String, String>,
}

impl KafkaTransportConfig {
    /// Create a config for the given topic with default producer settings.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition_key_field: None,
            batch_size: Self::default_batch_size(),
            linger_ms: Self::default_linger_ms(),
            compression_type: Self::default_compression_type(),
            kafka_producer_properties: Default::default(),
        }
    }

    fn default_batch_size() -> u32 {
        16_384
    }

    fn default_linger_ms() -> u32 {
        10
    }

    fn default_compression_type() -> String {
        "snappy".into()
    }
}

/// gRPC client configuration of an output route.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcTransportConfig {
    /// The service name of the target, resolved through the catalog, or a
    /// bare step reference within the same pipeline.
    pub service_name: String,
    /// Additional raw client properties, e.g. `timeout` and `retry`.
    #[serde(default)]
    pub grpc_client_properties: BTreeMap<String, String>,
}

/// A Kafka input feeding a step.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaInputDefinition {
    /// The topics this input listens on.
    pub listen_topics: Vec<String>,
    /// Consumer group id, defaulting to the pipeline convention group.
    #[serde(default)]
    pub consumer_group_id: Option<String>,
    /// Additional raw consumer properties.
    #[serde(default)]
    pub kafka_consumer_properties: BTreeMap<String, String>,
}
