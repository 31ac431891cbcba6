use std::collections::HashMap;

use ghwatch_core::{Run, Workflow, WorkflowId};

/// Workflow id → display name, loaded once at bootstrap.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    names: HashMap<WorkflowId, String>,
}

impl Catalog {
    pub fn from_workflows(workflows: Vec<Workflow>) -> Self {
        Self {
            names: workflows.into_iter().map(|w| (w.id, w.name)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Label for a run: its workflow's name, else the run's own name,
    /// else `workflow <id>`.
    pub fn label_for(&self, run: &Run) -> String {
        if let Some(name) = self.names.get(&run.workflow_id) {
            return name.clone();
        }
        match run.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("workflow {}", run.workflow_id),
        }
    }
}
