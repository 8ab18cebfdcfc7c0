pub mod graph;
pub mod presets;
pub mod schema;
pub mod stage;

pub use graph::{GraphError, TaskGraph, TaskGraphBuilder};
pub use presets::{cover_letter_graph, deeper_research_graph, research_graph};
pub use schema::{FieldShape, OutputField, OutputSchema, SchemaViolation};
pub use stage::{
    field_is_present, render_instruction, StageCondition, TaskStage, TaskStageBuilder,
};
