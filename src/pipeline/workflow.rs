//! Dependency graph / workflow engine.
//!
//! The workflow step list is the single authoritative status table; the
//! case graph is a display projection synchronized after every refresh.
//! Step status is a pure function of field fill state, the explicit
//! completion overlay, and dependency completion.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::catalog::model::FlowPack;
use crate::session::model::{
    CaseGraph, CaseGraphEdge, CaseGraphNode, StepStatus, WorkflowStep,
};

/// Required entities whose field value is empty or whitespace, in pack
/// declaration order.
pub fn compute_missing_items(
    required_entities: &[String],
    fields: &BTreeMap<String, String>,
) -> Vec<String> {
    required_entities
        .iter()
        .filter(|entity| {
            fields
                .get(entity.as_str())
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

/// Re-derive every step's status in declaration order.
///
/// Blocked overlays everything: a step with any incomplete dependency is
/// blocked regardless of its own completion state. The explicit overlay
/// wins next, then field-derived completion.
pub fn refresh_step_statuses(workflow: &mut [WorkflowStep], fields: &BTreeMap<String, String>) {
    let mut completed: BTreeSet<String> = BTreeSet::new();

    for step in workflow.iter_mut() {
        if !step.dependencies.is_empty()
            && !step.dependencies.iter().all(|dep| completed.contains(dep))
        {
            step.status = StepStatus::Blocked;
            continue;
        }

        let fields_complete = !step.required_fields.is_empty()
            && step
                .required_fields
                .iter()
                .all(|field| fields.get(field).map(|v| !v.trim().is_empty()).unwrap_or(false));

        if step.explicitly_complete || fields_complete {
            step.status = StepStatus::Complete;
            completed.insert(step.step_id.clone());
        } else {
            step.status = StepStatus::Pending;
        }
    }
}

/// Propagate workflow status into the graph projection (never the reverse).
pub fn sync_graph_from_workflow(graph: &mut CaseGraph, workflow: &[WorkflowStep]) {
    let statuses: BTreeMap<&str, StepStatus> = workflow
        .iter()
        .map(|step| (step.step_id.as_str(), step.status))
        .collect();
    for node in &mut graph.nodes {
        if let Some(&status) = statuses.get(node.node_id.as_str()) {
            node.status = status;
        }
    }
}

/// Set or clear a step's explicit completion overlay.
///
/// Clearing (unmark/reopen) does not force the step pending: field-derived
/// completion still applies on the next refresh.
pub fn mark_step(workflow: &mut [WorkflowStep], step_id: &str, complete: bool) {
    if let Some(step) = workflow.iter_mut().find(|s| s.step_id == step_id) {
        step.explicitly_complete = complete;
    }
}

/// Materialize the dependency graph for a pack: one node per step node,
/// one edge per declared dependency.
pub fn build_case_graph(pack: &FlowPack) -> CaseGraph {
    let nodes = pack
        .step_nodes
        .iter()
        .map(|node| CaseGraphNode {
            node_id: node.node_id.clone(),
            node_type: node.node_type.clone(),
            title: node.title.clone(),
            description: node.description.clone(),
            required_fields: node.required_fields.clone(),
            dependencies: node.dependencies.clone(),
            status: StepStatus::Pending,
        })
        .collect();

    let edges = pack
        .step_nodes
        .iter()
        .flat_map(|node| {
            node.dependencies.iter().map(|dep| CaseGraphEdge {
                edge_id: format!("{}->{}", dep, node.node_id),
                from_node: dep.clone(),
                to_node: node.node_id.clone(),
                edge_type: "dependency".into(),
            })
        })
        .collect();

    CaseGraph {
        flow_id: pack.flow_id.clone(),
        nodes,
        edges,
    }
}

/// Project the graph into the linear workflow view.
pub fn graph_to_workflow(graph: &CaseGraph) -> Vec<WorkflowStep> {
    graph
        .nodes
        .iter()
        .map(|node| WorkflowStep {
            step_id: node.node_id.clone(),
            title: node.title.clone(),
            description: node.description.clone(),
            node_type: node.node_type.clone(),
            required_fields: node.required_fields.clone(),
            dependencies: node.dependencies.clone(),
            status: node.status,
            explicitly_complete: false,
        })
        .collect()
}
