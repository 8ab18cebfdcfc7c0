use crate::capability::HttpCapabilityProvider;
use crate::config::{load_settings, DEFAULT_SETTINGS_FILE_NAME};
use crate::orchestrator::{fold_run_into_session, Orchestrator};
use crate::pipeline::research_graph;
use crate::server::{serve, App};
use crate::session::SessionState;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let mut args = args.into_iter();
    let command = args.next();
    let rest: Vec<String> = args.collect();
    match command.as_deref() {
        None | Some("help") | Some("--help") => Ok(usage()),
        Some("serve") => serve_command(rest),
        Some("run") => run_command(rest),
        Some(other) => Err(format!("unknown command `{other}`\n\n{}", usage())),
    }
}

fn usage() -> String {
    [
        "Usage:",
        "  labscout serve [--config labscout.yaml]",
        "      Start the research pipeline service.",
        "  labscout run --topic <topic> --university <university> [--resume <resume>] [--config labscout.yaml]",
        "      Run the primary research pipeline once and print the result as JSON.",
        "  labscout help",
        "      Show this message.",
    ]
    .join("\n")
}

fn parse_flags(args: &[String]) -> Result<BTreeMap<String, String>, String> {
    let mut flags = BTreeMap::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(name) = arg.strip_prefix("--") else {
            return Err(format!("unexpected argument `{arg}`"));
        };
        let value = iter
            .next()
            .ok_or_else(|| format!("flag `--{name}` requires a value"))?;
        flags.insert(name.to_string(), value.clone());
    }
    Ok(flags)
}

fn settings_path(flags: &BTreeMap<String, String>) -> PathBuf {
    flags
        .get("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE_NAME))
}

fn serve_command(args: Vec<String>) -> Result<String, String> {
    let flags = parse_flags(&args)?;
    let settings = load_settings(&settings_path(&flags)).map_err(|e| e.to_string())?;
    let provider =
        HttpCapabilityProvider::from_settings(&settings.capability).map_err(|e| e.to_string())?;
    let address = settings.bind_address.clone();
    let app = Arc::new(App::new(settings, Arc::new(provider)));
    println!("labscout listening on {address}");
    serve(app).map_err(|e| e.to_string())?;
    Ok("server stopped".to_string())
}

fn run_command(args: Vec<String>) -> Result<String, String> {
    let flags = parse_flags(&args)?;
    let topic = flags.get("topic").cloned().unwrap_or_default();
    let university = flags.get("university").cloned().unwrap_or_default();
    let resume = flags.get("resume").cloned().unwrap_or_default();
    if topic.is_empty() && university.is_empty() {
        return Err(format!(
            "run requires at least --topic or --university\n\n{}",
            usage()
        ));
    }

    let settings = load_settings(&settings_path(&flags)).map_err(|e| e.to_string())?;
    let provider =
        HttpCapabilityProvider::from_settings(&settings.capability).map_err(|e| e.to_string())?;
    let orchestrator = Orchestrator::new(Arc::new(provider), settings.capability.model.clone())
        .with_log_root(settings.state_root.clone());

    let mut merged = Map::new();
    merged.insert("topic".to_string(), Value::String(topic));
    merged.insert("university".to_string(), Value::String(university));
    merged.insert("resume".to_string(), Value::String(resume));

    let graph = research_graph();
    let run = orchestrator.execute(&graph, merged);
    let mut state = SessionState::default();
    fold_run_into_session(&mut state, &run);

    serde_json::to_string_pretty(&json!({
        "professors": state.professors,
        "labs": state.labs,
        "raw_result": state.raw_result,
        "run": run,
    }))
    .map_err(|e| e.to_string())
}
