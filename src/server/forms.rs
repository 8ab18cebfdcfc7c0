use std::collections::BTreeMap;

pub const SESSION_COOKIE: &str = "labscout_session";

pub fn parse_form(body: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let Some(key) = decode_component(key) else {
            continue;
        };
        let Some(value) = decode_component(value) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        fields.insert(key, value);
    }
    fields
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .ok()
        .map(|decoded| decoded.into_owned())
}

pub fn form_value(fields: &BTreeMap<String, String>, name: &str) -> String {
    fields
        .get(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

pub fn cookie_session_token(header: &str) -> Option<String> {
    for part in header.split(';') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        if name.trim() == SESSION_COOKIE {
            let token = value.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    None
}

pub fn session_cookie_header(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly")
}
