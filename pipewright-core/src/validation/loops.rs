//! Pipeline loop validators.
//!
//! The intra-pipeline unit runs a real cycle detection over the
//! step → target-step edges. The inter-pipeline unit covers the slice of
//! cross-pipeline feedback visible from a single config: a pipeline that both
//! publishes to and consumes from the same external topic.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::model::PipelineConfig;
use crate::validation::{PipelineValidator, ValidationMode, ValidationResult};

/// Detects cycles in the step graph of a single pipeline.
pub struct IntraPipelineLoopValidator;

impl PipelineValidator for IntraPipelineLoopValidator {
    fn name(&self) -> &'static str {
        "intra-pipeline-loop"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for step_id in config.steps.keys() {
            nodes.insert(step_id.as_str(), graph.add_node(step_id.as_str()));
        }
        for (step_id, step) in &config.steps {
            for output in step.outputs.values() {
                let Some(target) = output.target_step_name.as_deref() else { continue };
                // Unresolvable targets are the routing validator's concern.
                if let (Some(&from), Some(&to)) = (nodes.get(step_id.as_str()), nodes.get(target)) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut errors = Vec::new();
        for component in tarjan_scc(&graph) {
            let is_cycle = component.len() > 1 || component.iter().any(|&node| graph.contains_edge(node, node));
            if !is_cycle {
                continue;
            }
            let mut steps: Vec<&str> = component.iter().map(|&node| graph[node]).collect();
            steps.sort_unstable();
            errors.push(format!(
                "pipeline `{}` contains a step cycle involving: {}",
                config.name,
                steps.join(" -> ")
            ));
        }
        ValidationResult::from_parts(errors, Vec::new())
    }
}

/// Warns when a pipeline consumes an external topic it also publishes to,
/// which would feed the pipeline its own output.
pub struct InterPipelineLoopValidator;

impl PipelineValidator for InterPipelineLoopValidator {
    fn name(&self) -> &'static str {
        "inter-pipeline-loop"
    }

    fn priority(&self) -> u32 {
        110
    }

    fn validate(&self, config: &PipelineConfig, _mode: ValidationMode) -> ValidationResult {
        // Topics published without an in-pipeline target step are edges
        // leaving this pipeline.
        let external_topics: Vec<&str> = config
            .steps
            .values()
            .flat_map(|step| step.outputs.values())
            .filter(|output| output.target_step_name.is_none())
            .filter_map(|output| output.kafka_transport.as_ref())
            .map(|kafka| kafka.topic.as_str())
            .collect();

        let mut warnings = Vec::new();
        for (step_id, step) in &config.steps {
            for input in &step.kafka_inputs {
                for topic in &input.listen_topics {
                    if external_topics.contains(&topic.as_str()) {
                        warnings.push(format!(
                            "step `{}` listens on topic `{}` which this pipeline also publishes to, forming a feedback loop",
                            step_id, topic
                        ));
                    }
                }
            }
        }
        ValidationResult::from_parts(Vec::new(), warnings)
    }
}
