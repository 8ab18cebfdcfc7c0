use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

const SESSION_TOKEN_BYTES: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("failed to generate session token: {0}")]
    TokenGeneration(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub research_interests: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lab {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub professors: Vec<Professor>,
    #[serde(default)]
    pub labs: Vec<Lab>,
    #[serde(default)]
    pub raw_result: Option<String>,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub stage_outputs: BTreeMap<String, Map<String, Value>>,
}

impl SessionState {
    pub fn has_accumulated_results(&self) -> bool {
        !self.professors.is_empty() || !self.labs.is_empty() || self.raw_result.is_some()
    }

    pub fn find_professor(&self, name: &str) -> Option<&Professor> {
        self.professors
            .iter()
            .find(|professor| professor.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn find_lab(&self, name: &str) -> Option<&Lab> {
        self.labs
            .iter()
            .find(|lab| lab.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Process-wide token → session registry. The registry mutex is held only to
/// resolve a token; read-modify-write runs under the per-session mutex, so
/// requests for different tokens never serialize against each other.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<BTreeMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses the caller's token when it backs a live session; otherwise
    /// mints a fresh token and an empty session. Returns `true` when a new
    /// session was created.
    pub fn get_or_create(&self, token: Option<&str>) -> Result<(String, bool), SessionError> {
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            if self.resolve(token).is_some() {
                return Ok((token.to_string(), false));
            }
        }
        let token = mint_token()?;
        let mut sessions = lock_registry(&self.sessions);
        sessions.insert(token.clone(), Arc::new(Mutex::new(SessionState::default())));
        Ok((token, true))
    }

    pub fn read(&self, token: &str) -> Result<SessionState, SessionError> {
        let session = self.resolve(token).ok_or(SessionError::NotFound)?;
        let state = lock_session(&session);
        Ok(state.clone())
    }

    pub fn update<T>(
        &self,
        token: &str,
        mutator: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, SessionError> {
        let session = self.resolve(token).ok_or(SessionError::NotFound)?;
        let mut state = lock_session(&session);
        Ok(mutator(&mut state))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.resolve(token).is_some()
    }

    pub fn len(&self) -> usize {
        lock_registry(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, token: &str) -> Option<Arc<Mutex<SessionState>>> {
        lock_registry(&self.sessions).get(token).cloned()
    }
}

fn lock_registry(
    sessions: &Mutex<BTreeMap<String, Arc<Mutex<SessionState>>>>,
) -> MutexGuard<'_, BTreeMap<String, Arc<Mutex<SessionState>>>> {
    sessions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_session(session: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    session
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn mint_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    getrandom::getrandom(&mut bytes)
        .map_err(|err| SessionError::TokenGeneration(err.to_string()))?;
    Ok(to_hex(&bytes))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
