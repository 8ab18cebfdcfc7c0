use super::stage::TaskStage;
use crate::shared::GraphId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{0}")]
    InvalidIdentifier(String),
    #[error("stage `{stage_id}` requires a capability reference")]
    MissingCapability { stage_id: String },
    #[error("graph `{graph_id}` declares no stages")]
    EmptyGraph { graph_id: String },
    #[error("graph `{graph_id}` declares stage `{stage_id}` more than once")]
    DuplicateStage { graph_id: String, stage_id: String },
    #[error("stage `{stage_id}` depends on `{field}` which no request field or earlier stage provides")]
    UnknownDependency { stage_id: String, field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    id: GraphId,
    request_fields: Vec<String>,
    stages: Vec<TaskStage>,
}

impl TaskGraph {
    pub fn builder(id: &str) -> TaskGraphBuilder {
        TaskGraphBuilder {
            id: id.to_string(),
            request_fields: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn id(&self) -> &GraphId {
        &self.id
    }

    pub fn request_fields(&self) -> &[String] {
        &self.request_fields
    }

    /// Execution order is declaration order; the orchestrator never reorders.
    pub fn stages(&self) -> &[TaskStage] {
        &self.stages
    }
}

#[derive(Debug, Clone)]
pub struct TaskGraphBuilder {
    id: String,
    request_fields: Vec<String>,
    stages: Vec<TaskStage>,
}

impl TaskGraphBuilder {
    pub fn request_field(mut self, field: impl Into<String>) -> Self {
        self.request_fields.push(field.into());
        self
    }

    pub fn stage(mut self, stage: TaskStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let id = GraphId::parse(&self.id).map_err(GraphError::InvalidIdentifier)?;
        if self.stages.is_empty() {
            return Err(GraphError::EmptyGraph {
                graph_id: id.to_string(),
            });
        }

        let mut available: BTreeSet<String> = self.request_fields.iter().cloned().collect();
        let mut seen_stage_ids = BTreeSet::new();
        for stage in &self.stages {
            if !seen_stage_ids.insert(stage.id.to_string()) {
                return Err(GraphError::DuplicateStage {
                    graph_id: id.to_string(),
                    stage_id: stage.id.to_string(),
                });
            }
            for dependency in &stage.inputs {
                if !available.contains(dependency) {
                    return Err(GraphError::UnknownDependency {
                        stage_id: stage.id.to_string(),
                        field: dependency.clone(),
                    });
                }
            }
            for field in stage.schema.field_names() {
                available.insert(field.to_string());
            }
        }

        Ok(TaskGraph {
            id,
            request_fields: self.request_fields,
            stages: self.stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{OutputField, OutputSchema};

    fn stage(id: &str) -> TaskStage {
        TaskStage::builder(id, "matcher")
            .schema(OutputSchema::new(vec![OutputField::list(format!(
                "{id}_items"
            ))]))
            .build()
            .expect("stage builds")
    }

    #[test]
    fn build_rejects_duplicate_stage_ids() {
        let err = TaskGraph::builder("research")
            .stage(stage("find"))
            .stage(stage("find"))
            .build()
            .expect_err("must fail");
        assert!(matches!(err, GraphError::DuplicateStage { .. }));
    }

    #[test]
    fn build_rejects_dependency_nothing_provides() {
        let needy = TaskStage::builder("rank", "ranker")
            .input("scores")
            .build()
            .expect("stage builds");
        let err = TaskGraph::builder("research")
            .request_field("topic")
            .stage(needy)
            .build()
            .expect_err("must fail");
        assert!(err.to_string().contains("`scores`"));
    }

    #[test]
    fn later_stage_may_depend_on_earlier_stage_output() {
        let first = stage("find");
        let second = TaskStage::builder("rank", "ranker")
            .input("find_items")
            .build()
            .expect("stage builds");
        let graph = TaskGraph::builder("research")
            .request_field("topic")
            .stage(first)
            .stage(second)
            .build()
            .expect("graph builds");
        assert_eq!(graph.stages().len(), 2);
        assert_eq!(graph.id().as_str(), "research");
    }

    #[test]
    fn build_rejects_empty_graphs() {
        let err = TaskGraph::builder("research")
            .build()
            .expect_err("must fail");
        assert!(matches!(err, GraphError::EmptyGraph { .. }));
    }
}
