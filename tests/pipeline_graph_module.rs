use labscout::pipeline::{
    cover_letter_graph, deeper_research_graph, field_is_present, render_instruction,
    research_graph, OutputField, OutputSchema, StageCondition, TaskGraph, TaskStage,
};
use serde_json::{json, Map, Value};

fn merged(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn graph_module_validates_declarations_at_build_time() {
    let duplicate = TaskGraph::builder("research")
        .stage(
            TaskStage::builder("find", "matcher")
                .build()
                .expect("stage"),
        )
        .stage(
            TaskStage::builder("find", "matcher")
                .build()
                .expect("stage"),
        )
        .build();
    assert!(duplicate
        .expect_err("duplicate ids must fail")
        .to_string()
        .contains("more than once"));

    let dangling = TaskGraph::builder("research")
        .request_field("topic")
        .stage(
            TaskStage::builder("rank", "ranker")
                .input("scores")
                .build()
                .expect("stage"),
        )
        .build();
    assert!(dangling
        .expect_err("unknown dependency must fail")
        .to_string()
        .contains("no request field or earlier stage"));
}

#[test]
fn graph_module_accepts_chained_stage_dependencies() {
    let graph = TaskGraph::builder("research")
        .request_field("topic")
        .stage(
            TaskStage::builder("find", "matcher")
                .input("topic")
                .schema(OutputSchema::new(vec![OutputField::list("professors")]))
                .build()
                .expect("find stage"),
        )
        .stage(
            TaskStage::builder("rank", "ranker")
                .input("professors")
                .condition(StageCondition::has_field("professors"))
                .build()
                .expect("rank stage"),
        )
        .build()
        .expect("graph builds");

    assert_eq!(graph.stages().len(), 2);
    assert_eq!(graph.stages()[1].id.as_str(), "rank");
}

#[test]
fn condition_presence_rules_match_the_gating_contract() {
    let input = merged(&[
        ("topic", json!("AI")),
        ("blank", json!("  ")),
        ("empty_list", json!([])),
        ("filled_list", json!(["x"])),
    ]);
    assert!(field_is_present(&input, "topic"));
    assert!(field_is_present(&input, "filled_list"));
    assert!(!field_is_present(&input, "blank"));
    assert!(!field_is_present(&input, "empty_list"));
    assert!(!field_is_present(&input, "absent"));
}

#[test]
fn instruction_templates_render_from_merged_values() {
    let inputs = merged(&[("topic", json!("robotics")), ("university", json!("UT Austin"))]);
    let rendered = render_instruction("{topic} at {university}; again {topic}", &inputs);
    assert_eq!(rendered, "robotics at UT Austin; again robotics");
}

#[test]
fn preset_graphs_cover_all_three_service_pipelines() {
    let research = research_graph();
    assert_eq!(research.stages().len(), 1);
    assert!(research.stages()[0].schema.get("professors").is_some());
    assert!(research.stages()[0].schema.get("labs").is_some());

    let deeper = deeper_research_graph();
    assert_eq!(
        deeper.stages()[0].condition,
        StageCondition::has_field("prof_name")
    );
    for field in ["publications", "projects", "courses"] {
        assert!(deeper.stages()[0].schema.get(field).is_some());
    }

    let cover = cover_letter_graph();
    assert_eq!(
        cover.stages()[0].condition,
        StageCondition::has_field("resume")
    );
    for field in ["email_subject", "email_body", "cover_letter"] {
        assert!(cover.stages()[0].schema.get(field).is_some());
    }
}
