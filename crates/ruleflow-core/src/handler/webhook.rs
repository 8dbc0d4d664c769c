use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use tracing::debug;

use super::{ActionFailure, ActionHandler, HandlerOutcome, HandlerResult};
use crate::action::{HttpMethod, WebhookAction};
use crate::types::OrgId;

/// Response bodies longer than this are cut before being stored on the
/// execution record.
const MAX_BODY_CHARS: usize = 4096;

/// Calls an external HTTP endpoint. Any non-2xx status is a failure.
pub struct WebhookHandler {
    timeout: Duration,
}

impl WebhookHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self) -> Result<Client, ActionFailure> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ActionFailure(format!("http client: {e}")))
    }

    fn transport_failure(&self, e: reqwest::Error) -> ActionFailure {
        if e.is_timeout() {
            ActionFailure(format!("webhook timed out after {}s", self.timeout.as_secs()))
        } else {
            ActionFailure(format!("webhook request failed: {e}"))
        }
    }
}

fn method(m: HttpMethod) -> reqwest::Method {
    match m {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn header_map(headers: &std::collections::BTreeMap<String, String>) -> Result<HeaderMap, ActionFailure> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let n = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ActionFailure(format!("invalid header name '{name}'")))?;
        let v = HeaderValue::from_str(value)
            .map_err(|_| ActionFailure(format!("invalid value for header '{name}'")))?;
        map.insert(n, v);
    }
    Ok(map)
}

/// Oversized bodies are stored as a cut string, never parsed.
fn body_value(text: String) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if text.chars().count() > MAX_BODY_CHARS {
        return Value::String(text.chars().take(MAX_BODY_CHARS).collect());
    }
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) => Value::String(text),
    }
}

impl ActionHandler for WebhookHandler {
    type Payload = WebhookAction;

    fn execute(&self, payload: &WebhookAction, _org: &OrgId) -> HandlerResult {
        let client = self.client()?;
        let mut request = client
            .request(method(payload.method), &payload.url)
            .headers(header_map(&payload.headers)?);
        if let Some(body) = &payload.body {
            request = request.json(body);
        }

        debug!(method = payload.method.as_str(), url = %payload.url, "calling webhook");
        let response = request.send().map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionFailure(format!(
                "webhook returned HTTP {}",
                status.as_u16()
            )));
        }
        // The timeout also covers reading the body.
        let text = response.text().map_err(|e| self.transport_failure(e))?;
        let body = body_value(text);
        Ok(HandlerOutcome::applied(json!({
            "status": status.as_u16(),
            "body": body,
        })))
    }

    fn simulate(&self, payload: &WebhookAction) -> HandlerOutcome {
        HandlerOutcome::simulated(json!({
            "dry_run": true,
            "method": payload.method.as_str(),
            "url": payload.url,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn org() -> OrgId {
        OrgId::new("acme").unwrap()
    }

    fn payload(url: String) -> WebhookAction {
        WebhookAction {
            url,
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            body: Some(json!({"item": "X"})),
        }
    }

    #[test]
    fn success_records_status_and_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/hook")
            .match_header("x-token", "abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create();

        let mut p = payload(format!("{}/hook", server.url()));
        p.headers.insert("x-token".into(), "abc".into());

        let outcome = WebhookHandler::new(Duration::from_secs(5))
            .execute(&p, &org())
            .unwrap();
        mock.assert();
        assert_eq!(outcome.data["status"], 200);
        assert_eq!(outcome.data["body"]["ok"], true);
    }

    #[test]
    fn non_success_status_fails() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/hook").with_status(500).create();

        let failure = WebhookHandler::new(Duration::from_secs(5))
            .execute(&payload(format!("{}/hook", server.url())), &org())
            .unwrap_err();
        assert_eq!(failure.0, "webhook returned HTTP 500");
    }

    #[test]
    fn unreachable_host_fails() {
        let failure = WebhookHandler::new(Duration::from_secs(2))
            .execute(&payload("http://127.0.0.1:1/hook".into()), &org())
            .unwrap_err();
        assert!(failure.0.starts_with("webhook"), "{failure}");
    }

    #[test]
    fn plain_text_body_is_kept_as_string() {
        assert_eq!(body_value("accepted".into()), json!("accepted"));
        assert_eq!(body_value(String::new()), Value::Null);
    }

    #[test]
    fn oversized_json_body_is_cut() {
        let big = serde_json::to_string(&json!({ "data": "x".repeat(MAX_BODY_CHARS * 2) })).unwrap();
        let stored = body_value(big);
        let text = stored.as_str().unwrap();
        assert_eq!(text.chars().count(), MAX_BODY_CHARS);
        assert!(text.starts_with(r#"{"data":"xxx"#));
    }

    /// Accepts one connection, reads the request, writes `reply`, then holds
    /// the socket open without sending anything else.
    fn stalling_server(reply: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf);
                let _ = socket.write_all(reply);
                let _ = socket.flush();
                thread::sleep(Duration::from_secs(5));
            }
        });
        format!("http://{addr}/hook")
    }

    #[test]
    fn silent_endpoint_times_out() {
        let url = stalling_server(b"");
        let failure = WebhookHandler::new(Duration::from_secs(1))
            .execute(&payload(url), &org())
            .unwrap_err();
        assert!(failure.0.contains("timed out after 1s"), "{failure}");
    }

    #[test]
    fn body_that_stalls_after_status_times_out() {
        let url = stalling_server(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nx");
        let failure = WebhookHandler::new(Duration::from_secs(1))
            .execute(&payload(url), &org())
            .unwrap_err();
        assert!(failure.0.contains("timed out"), "{failure}");
    }
}
