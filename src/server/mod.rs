pub mod forms;
pub mod routes;

pub use forms::{cookie_session_token, session_cookie_header, SESSION_COOKIE};
pub use routes::{handle_request, HttpReply, RouteRequest};

use crate::capability::CapabilityProvider;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{cover_letter_graph, deeper_research_graph, research_graph, TaskGraph};
use crate::session::SessionStore;
use crate::snapshot::SnapshotStore;
use std::io::Read;
use std::sync::Arc;
use std::thread;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },
}

pub struct PresetGraphs {
    pub research: TaskGraph,
    pub deeper_research: TaskGraph,
    pub cover_letter: TaskGraph,
}

impl Default for PresetGraphs {
    fn default() -> Self {
        Self {
            research: research_graph(),
            deeper_research: deeper_research_graph(),
            cover_letter: cover_letter_graph(),
        }
    }
}

pub struct App {
    pub settings: Settings,
    pub sessions: SessionStore,
    pub orchestrator: Orchestrator,
    pub snapshot: Option<SnapshotStore>,
    pub graphs: PresetGraphs,
}

impl App {
    pub fn new(settings: Settings, provider: Arc<dyn CapabilityProvider>) -> Self {
        let orchestrator = Orchestrator::new(provider, settings.capability.model.clone())
            .with_log_root(settings.state_root.clone());
        let snapshot = settings.resolve_snapshot_path().map(SnapshotStore::new);
        Self {
            settings,
            sessions: SessionStore::new(),
            orchestrator,
            snapshot,
            graphs: PresetGraphs::default(),
        }
    }
}

pub fn serve(app: Arc<App>) -> Result<(), ServerError> {
    let address = app.settings.bind_address.clone();
    let server = tiny_http::Server::http(address.as_str()).map_err(|e| ServerError::Bind {
        address: address.clone(),
        reason: e.to_string(),
    })?;
    let server = Arc::new(server);

    let workers = app.settings.workers.max(1);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let server = Arc::clone(&server);
        let app = Arc::clone(&app);
        handles.push(thread::spawn(move || worker_loop(server, app)));
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn worker_loop(server: Arc<tiny_http::Server>, app: Arc<App>) {
    loop {
        let mut request = match server.recv() {
            Ok(request) => request,
            Err(_) => break,
        };

        let method = request.method().to_string();
        let path = request
            .url()
            .split('?')
            .next()
            .unwrap_or("/")
            .to_string();
        let session_token = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("Cookie"))
            .and_then(|header| cookie_session_token(header.value.as_str()));

        let mut body = String::new();
        let _ = request.as_reader().read_to_string(&mut body);

        let reply = handle_request(
            &app,
            &RouteRequest {
                method,
                path,
                body,
                session_token,
            },
        );
        respond_json(request, reply);
    }
}

fn respond_json(request: tiny_http::Request, reply: HttpReply) {
    let body = serde_json::to_string(&reply.body).unwrap_or_else(|_| "{}".to_string());
    let mut response = tiny_http::Response::from_string(body)
        .with_status_code(reply.status)
        .with_header(
            tiny_http::Header::from_bytes("Content-Type", "application/json")
                .expect("static header is valid"),
        );
    if let Some(cookie) = reply.set_cookie {
        response = response.with_header(
            tiny_http::Header::from_bytes("Set-Cookie", cookie.as_bytes())
                .expect("cookie header is valid"),
        );
    }
    let _ = request.respond(response);
}
