use super::graph::TaskGraph;
use super::schema::{OutputField, OutputSchema};
use super::stage::{StageCondition, TaskStage};

pub const RESEARCH_GRAPH_ID: &str = "research";
pub const DEEPER_RESEARCH_GRAPH_ID: &str = "deeper_research";
pub const COVER_LETTER_GRAPH_ID: &str = "cover_letter";

pub const RESEARCH_STAGE_ID: &str = "find_positions";
pub const DEEPER_RESEARCH_STAGE_ID: &str = "professor_profile";
pub const COVER_LETTER_STAGE_ID: &str = "draft_cover_letter";

/// Primary graph behind `POST /`: one matcher stage returning professor and
/// lab records for the submitted topic/university.
pub fn research_graph() -> TaskGraph {
    TaskGraph::builder(RESEARCH_GRAPH_ID)
        .request_field("topic")
        .request_field("university")
        .request_field("resume")
        .stage(
            TaskStage::builder(RESEARCH_STAGE_ID, "research_matcher")
                .instruction(
                    "Identify professors at {university} whose research matches {topic}. \
                     For each professor report name, research_interests, contact_email and url. \
                     Also list labs at {university} focused on {topic} with name, focus and url. \
                     The applicant background is: {resume}",
                )
                .input("topic")
                .input("university")
                .input("resume")
                .schema(OutputSchema::new(vec![
                    OutputField::list("professors"),
                    OutputField::list("labs"),
                ]))
                .build()
                .expect("research stage is valid"),
        )
        .build()
        .expect("research graph is valid")
}

/// Per-professor drill-down behind `POST /run_deeper_research`; gated on the
/// professor actually being named in the request.
pub fn deeper_research_graph() -> TaskGraph {
    TaskGraph::builder(DEEPER_RESEARCH_GRAPH_ID)
        .request_field("prof_name")
        .request_field("prof_url")
        .stage(
            TaskStage::builder(DEEPER_RESEARCH_STAGE_ID, "deeper_researcher")
                .instruction(
                    "Research professor {prof_name} ({prof_url}) in depth. \
                     Report their recent publications, active projects and taught courses.",
                )
                .input("prof_name")
                .input("prof_url")
                .condition(StageCondition::has_field("prof_name"))
                .schema(OutputSchema::new(vec![
                    OutputField::list("publications"),
                    OutputField::list("projects"),
                    OutputField::list("courses"),
                ]))
                .build()
                .expect("deeper research stage is valid"),
        )
        .build()
        .expect("deeper research graph is valid")
}

/// Cover-letter drafting behind `POST /run_cover_letter`; reads the resume
/// accumulated on the session, so the stage skips when none is stored.
pub fn cover_letter_graph() -> TaskGraph {
    TaskGraph::builder(COVER_LETTER_GRAPH_ID)
        .request_field("prof_name")
        .request_field("prof_url")
        .request_field("resume")
        .stage(
            TaskStage::builder(COVER_LETTER_STAGE_ID, "cover_letter_writer")
                .instruction(
                    "Write an application email and cover letter addressed to professor \
                     {prof_name} ({prof_url}) for the applicant with this resume: {resume}",
                )
                .input("prof_name")
                .input("prof_url")
                .input("resume")
                .condition(StageCondition::has_field("resume"))
                .schema(OutputSchema::new(vec![
                    OutputField::text("email_subject"),
                    OutputField::text("email_body"),
                    OutputField::text("cover_letter"),
                ]))
                .build()
                .expect("cover letter stage is valid"),
        )
        .build()
        .expect("cover letter graph is valid")
}
