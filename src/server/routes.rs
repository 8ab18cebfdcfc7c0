use super::forms::{form_value, parse_form, session_cookie_header};
use super::App;
use crate::extract::extract_from_value;
use crate::orchestrator::{fold_run_into_session, merged_input_for, PipelineRun};
use crate::pipeline::{OutputSchema, TaskGraph};
use crate::session::SessionError;
use crate::shared::append_service_log_line;
use crate::snapshot::ResearchSnapshot;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub session_token: Option<String>,
}

impl RouteRequest {
    pub fn get(path: &str, session_token: Option<&str>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            body: String::new(),
            session_token: session_token.map(str::to_string),
        }
    }

    pub fn post(path: &str, body: &str, session_token: Option<&str>) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.to_string(),
            body: body.to_string(),
            session_token: session_token.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
    pub set_cookie: Option<String>,
}

impl HttpReply {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            set_cookie: None,
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
            set_cookie: None,
        }
    }

    fn with_cookie_for(mut self, token: &str, created: bool) -> Self {
        if created {
            self.set_cookie = Some(session_cookie_header(token));
        }
        self
    }
}

pub fn handle_request(app: &App, request: &RouteRequest) -> HttpReply {
    let reply = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => index_get(app, request),
        ("POST", "/") => index_post(app, request),
        ("POST", "/select") => select(app, request),
        ("POST", "/run_deeper_research") => {
            scoped_run(app, request, &app.graphs.deeper_research)
        }
        ("POST", "/run_cover_letter") => scoped_run(app, request, &app.graphs.cover_letter),
        _ => HttpReply::error(404, "not found"),
    };
    let _ = append_service_log_line(
        &app.settings.state_root,
        &format!(
            "http method={} path={} status={}",
            request.method, request.path, reply.status
        ),
    );
    reply
}

fn index_get(app: &App, request: &RouteRequest) -> HttpReply {
    let (token, created) = match app.sessions.get_or_create(request.session_token.as_deref()) {
        Ok(resolved) => resolved,
        Err(err) => return HttpReply::error(500, &err.to_string()),
    };
    hydrate_from_snapshot(app, &token);

    match app.sessions.read(&token) {
        Ok(state) => HttpReply::ok(json!({
            "professors": state.professors,
            "labs": state.labs,
            "raw_result": state.raw_result,
        }))
        .with_cookie_for(&token, created),
        Err(err) => HttpReply::error(500, &err.to_string()),
    }
}

fn index_post(app: &App, request: &RouteRequest) -> HttpReply {
    let (token, created) = match app.sessions.get_or_create(request.session_token.as_deref()) {
        Ok(resolved) => resolved,
        Err(err) => return HttpReply::error(500, &err.to_string()),
    };
    hydrate_from_snapshot(app, &token);

    let fields = parse_form(&request.body);
    let topic = form_value(&fields, "topic");
    let university = form_value(&fields, "university");
    let resume = form_value(&fields, "resume");

    let store_result = app.sessions.update(&token, |state| {
        if !university.is_empty() {
            state.university = Some(university.clone());
        }
        if !resume.is_empty() {
            state.resume = Some(resume.clone());
        }
    });
    if let Err(err) = store_result {
        return HttpReply::error(500, &err.to_string());
    }

    let run = match run_graph(
        app,
        &token,
        &app.graphs.research,
        &[
            ("topic", topic),
            ("university", university),
            ("resume", resume),
        ],
    ) {
        Ok(run) => run,
        Err(reply) => return reply,
    };
    write_snapshot_if_due(app, &token, &run);

    match app.sessions.read(&token) {
        Ok(state) => HttpReply::ok(json!({
            "professors": state.professors,
            "labs": state.labs,
            "raw_result": state.raw_result,
            "run": run_summary(&run),
        }))
        .with_cookie_for(&token, created),
        Err(err) => HttpReply::error(500, &err.to_string()),
    }
}

fn select(app: &App, request: &RouteRequest) -> HttpReply {
    let state = match required_session(app, request) {
        Ok(state) => state,
        Err(reply) => return reply,
    };

    let fields = parse_form(&request.body);
    let prof_name = form_value(&fields, "prof_name");
    let lab_name = form_value(&fields, "lab_name");

    if !prof_name.is_empty() {
        let stored = state.find_professor(&prof_name);
        let email = non_empty_or(
            form_value(&fields, "prof_email"),
            stored.map(|p| p.contact_email.clone()),
        );
        let research = non_empty_or(
            form_value(&fields, "prof_research"),
            stored.map(|p| p.research_interests.clone()),
        );
        let url = non_empty_or(form_value(&fields, "prof_url"), stored.map(|p| p.url.clone()));
        return HttpReply::ok(json!({
            "message": format!("You selected professor: {prof_name}, email: {email}"),
            "selected": {
                "type": "professor",
                "name": prof_name,
                "research_interests": research,
                "contact_email": email,
                "url": url,
            },
        }));
    }

    if !lab_name.is_empty() {
        let stored = state.find_lab(&lab_name);
        let url = non_empty_or(form_value(&fields, "lab_url"), stored.map(|l| l.url.clone()));
        let focus = non_empty_or(
            form_value(&fields, "lab_focus"),
            stored.map(|l| l.focus.clone()),
        );
        return HttpReply::ok(json!({
            "message": format!("You selected lab: {lab_name}, url: {url}"),
            "selected": {
                "type": "lab",
                "name": lab_name,
                "focus": focus,
                "url": url,
            },
        }));
    }

    HttpReply::ok(json!({ "message": "no selection received" }))
}

fn scoped_run(app: &App, request: &RouteRequest, graph: &TaskGraph) -> HttpReply {
    let token = match request.session_token.as_deref() {
        Some(token) if app.sessions.contains(token) => token.to_string(),
        _ => return HttpReply::error(404, "session not found"),
    };

    let fields = parse_form(&request.body);
    let prof_name = form_value(&fields, "prof_name");
    let prof_url = form_value(&fields, "prof_url");

    let run = match run_graph(
        app,
        &token,
        graph,
        &[("prof_name", prof_name), ("prof_url", prof_url)],
    ) {
        Ok(run) => run,
        Err(reply) => return reply,
    };

    let mut body = Map::new();
    for (field, value) in response_fields(graph, &run) {
        body.insert(field, value);
    }
    body.insert("run".to_string(), run_summary(&run));
    HttpReply::ok(Value::Object(body))
}

fn run_graph(
    app: &App,
    token: &str,
    graph: &TaskGraph,
    request_pairs: &[(&str, String)],
) -> Result<PipelineRun, HttpReply> {
    let state = app
        .sessions
        .read(token)
        .map_err(|err| HttpReply::error(500, &err.to_string()))?;

    let mut request_fields = Map::new();
    for (name, value) in request_pairs {
        request_fields.insert(name.to_string(), Value::String(value.clone()));
    }
    let merged = merged_input_for(&state, request_fields);
    let run = app.orchestrator.execute(graph, merged);

    app.sessions
        .update(token, |state| fold_run_into_session(state, &run))
        .map_err(|err| HttpReply::error(500, &err.to_string()))?;
    Ok(run)
}

fn required_session(
    app: &App,
    request: &RouteRequest,
) -> Result<crate::session::SessionState, HttpReply> {
    let Some(token) = request.session_token.as_deref() else {
        return Err(HttpReply::error(404, "session not found"));
    };
    app.sessions.read(token).map_err(|err| match err {
        SessionError::NotFound => HttpReply::error(404, "session not found"),
        other => HttpReply::error(500, &other.to_string()),
    })
}

fn hydrate_from_snapshot(app: &App, token: &str) {
    let Some(snapshot_store) = &app.snapshot else {
        return;
    };
    let fresh = app
        .sessions
        .read(token)
        .map(|state| !state.has_accumulated_results())
        .unwrap_or(false);
    if !fresh {
        return;
    }
    let snapshot = snapshot_store.read();
    if snapshot.is_empty() {
        return;
    }
    let _ = app
        .sessions
        .update(token, |state| snapshot.apply_to_session(state));
}

fn write_snapshot_if_due(app: &App, token: &str, run: &PipelineRun) {
    let Some(snapshot_store) = &app.snapshot else {
        return;
    };
    if !run.produced_structured_output() {
        return;
    }
    let Ok(state) = app.sessions.read(token) else {
        return;
    };
    let snapshot = ResearchSnapshot::from_session(&state);
    if snapshot.is_empty() {
        return;
    }
    if let Err(err) = snapshot_store.write(&snapshot) {
        let _ = append_service_log_line(
            &app.settings.state_root,
            &format!("snapshot write failed: {err}"),
        );
    }
}

/// Declared response fields of every stage in the graph, defaulted from the
/// run output so skipped and failed stages still answer with empty values.
fn response_fields(graph: &TaskGraph, run: &PipelineRun) -> BTreeMap<String, Value> {
    let output = Value::Object(run.output.clone());
    let mut fields = BTreeMap::new();
    for stage in graph.stages() {
        let schema: &OutputSchema = &stage.schema;
        for (name, value) in extract_from_value(Some(&output), schema) {
            fields.insert(name, value);
        }
    }
    fields
}

fn run_summary(run: &PipelineRun) -> Value {
    json!({
        "runId": run.run_id,
        "graphId": run.graph_id,
        "stages": run
            .stages
            .iter()
            .map(|outcome| {
                json!({
                    "stageId": outcome.stage_id,
                    "status": outcome.status,
                    "message": outcome.message,
                })
            })
            .collect::<Vec<_>>(),
    })
}

fn non_empty_or(value: String, fallback: Option<String>) -> String {
    if !value.is_empty() {
        return value;
    }
    fallback.unwrap_or_default()
}
