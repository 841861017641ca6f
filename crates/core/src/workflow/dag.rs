use crate::error::{Result, WorkflowError};
use crate::types::{StepId, Workflow};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Topo;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// DAG representation of a workflow, used for static diagnostics.
///
/// Building the graph never fails: dependencies naming unknown steps and
/// duplicate step ids are recorded and reported by [`WorkflowDag::validate`].
/// The executor itself does not need a valid graph; an invalid one simply
/// stalls and is reported as blocked.
pub struct WorkflowDag {
    graph: DiGraph<StepId, ()>,
    step_indices: HashMap<StepId, NodeIndex>,
    // (step, missing dependency)
    dangling: Vec<(StepId, StepId)>,
    duplicates: Vec<StepId>,
    // Listing order, used to keep wave output stable
    order: Vec<StepId>,
    declared: HashMap<StepId, Vec<StepId>>,
}

impl WorkflowDag {
    /// Build a DAG from a workflow
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut step_indices = HashMap::new();
        let mut duplicates = Vec::new();
        let mut order = Vec::new();
        let mut declared = HashMap::new();

        // Add all steps as nodes
        for step in &workflow.steps {
            if step_indices.contains_key(&step.id) {
                duplicates.push(step.id.clone());
                continue;
            }
            let node = graph.add_node(step.id.clone());
            step_indices.insert(step.id.clone(), node);
            order.push(step.id.clone());
            declared.insert(step.id.clone(), step.dependencies.clone());
        }

        // Add dependency edges
        let mut dangling = Vec::new();
        for step in &workflow.steps {
            let step_idx = step_indices[&step.id];
            for dep_id in &step.dependencies {
                match step_indices.get(dep_id) {
                    // Edge from dependency to dependent (dep -> step)
                    Some(dep_idx) => {
                        graph.update_edge(*dep_idx, step_idx, ());
                    }
                    None => dangling.push((step.id.clone(), dep_id.clone())),
                }
            }
        }

        Self {
            graph,
            step_indices,
            dangling,
            duplicates,
            order,
            declared,
        }
    }

    /// Check that every dependency exists and the graph is acyclic
    pub fn validate(&self) -> Result<()> {
        if let Some(step_id) = self.duplicates.first() {
            return Err(WorkflowError::DuplicateStep {
                step_id: step_id.clone(),
            });
        }

        if let Some((step_id, dependency)) = self.dangling.first() {
            return Err(WorkflowError::UnknownDependency {
                step_id: step_id.clone(),
                dependency: dependency.clone(),
            });
        }

        if is_cyclic_directed(&self.graph) {
            let mut steps: Vec<StepId> = tarjan_scc(&self.graph)
                .into_iter()
                .filter(|component| {
                    component.len() > 1 || self.graph.contains_edge(component[0], component[0])
                })
                .flatten()
                .map(|n| self.graph[n].clone())
                .collect();
            steps.sort();
            return Err(WorkflowError::CyclicDependency { steps });
        }

        Ok(())
    }

    /// Get steps in topological order (dependencies first).
    /// Steps on a cycle are omitted.
    pub fn topological_order(&self) -> Vec<StepId> {
        let mut topo = Topo::new(&self.graph);
        let mut steps = Vec::new();

        while let Some(node) = topo.next(&self.graph) {
            steps.push(self.graph[node].clone());
        }

        steps
    }

    /// Get dependencies for a step
    pub fn dependencies(&self, step_id: &StepId) -> Result<Vec<StepId>> {
        self.neighbors(step_id, Direction::Incoming)
    }

    /// Get steps that depend on the given step
    pub fn dependents(&self, step_id: &StepId) -> Result<Vec<StepId>> {
        self.neighbors(step_id, Direction::Outgoing)
    }

    fn neighbors(&self, step_id: &StepId, direction: Direction) -> Result<Vec<StepId>> {
        let node = self
            .step_indices
            .get(step_id)
            .ok_or_else(|| WorkflowError::StepNotFound {
                step_id: step_id.clone(),
            })?;

        let mut ids: Vec<StepId> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Check if all dependencies of a step are satisfied
    pub fn can_execute(&self, step_id: &StepId, completed_steps: &HashSet<StepId>) -> bool {
        self.declared
            .get(step_id)
            .is_some_and(|deps| deps.iter().all(|dep| completed_steps.contains(dep)))
    }

    /// Get all steps with no dependencies (can start immediately)
    pub fn entry_steps(&self) -> Vec<StepId> {
        self.order
            .iter()
            .filter(|id| self.declared[*id].is_empty())
            .cloned()
            .collect()
    }

    /// The waves a fault-free execution would dispatch, in order.
    /// Steps that can never become ready are left out.
    pub fn waves(&self) -> Vec<Vec<StepId>> {
        let mut completed: HashSet<StepId> = HashSet::new();
        let mut waves = Vec::new();

        loop {
            let wave: Vec<StepId> = self
                .order
                .iter()
                .filter(|id| !completed.contains(*id) && self.can_execute(id, &completed))
                .cloned()
                .collect();

            if wave.is_empty() {
                break;
            }

            completed.extend(wave.iter().cloned());
            waves.push(wave);
        }

        waves
    }

    /// Steps that no fault-free execution would ever reach
    pub fn unreachable_steps(&self) -> Vec<StepId> {
        let reached: HashSet<StepId> = self.waves().into_iter().flatten().collect();
        self.order
            .iter()
            .filter(|id| !reached.contains(*id))
            .cloned()
            .collect()
    }
}
