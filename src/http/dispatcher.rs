//! The HTTP front dispatcher: one incoming SCGI request in, one full HTTP
//! response string out. Ties together session lookup/creation, the
//! synchronous eval-wait, and outbox draining per `spec.md` §4.7.

use crate::gateway::Gateway;
use crate::http::scgi::{self, ScgiRequest};
use crate::http::wire_json;
use crate::message::{Message, MessageKind};

const CAPACITY_ERROR: &str = "the server is currently at maximum capacity";
const EXPIRED_ERROR: &str = "session expired";

/// Handles one request end to end and returns the full HTTP response text,
/// ready to be written back over the SCGI connection.
pub fn handle(gateway: &Gateway, req: &ScgiRequest) -> String {
    let mut token = req.cookie("SESSION_TOKEN").filter(|t| gateway.session_exists(t)).unwrap_or_default();
    let mut response = Vec::new();
    let mut waiting_for_eval = false;

    if let Some(raw) = req.form_field("request") {
        for message in wire_json::decode_messages(&raw) {
            match message.kind {
                MessageKind::InputStart => {
                    if !token.is_empty() {
                        gateway.mark_terminate(&token);
                    }
                    match gateway.acquire_session() {
                        Ok(new_token) => token = new_token,
                        Err(_) => response.push(fatal(CAPACITY_ERROR)),
                    }
                }
                MessageKind::InputPoll => {}
                kind => {
                    let is_eval = kind == MessageKind::InputEval;
                    if token.is_empty() || !gateway.push_inbox(&token, message) {
                        response.push(fatal(EXPIRED_ERROR));
                    } else if is_eval {
                        waiting_for_eval = true;
                    }
                }
            }
        }
    }

    if waiting_for_eval {
        gateway.wait_for_eval(&token);
    }

    if !token.is_empty() {
        gateway.drain_outbox(&token, &mut response);
    }

    let body = wire_json::encode_messages(&response);
    let mut out = Vec::new();
    scgi::write_response(&mut out, &token, &body).expect("writing to a Vec<u8> never fails");
    String::from_utf8(out).expect("response body and headers are all UTF-8")
}

fn fatal(text: &str) -> Message {
    Message::new(MessageKind::OutputFatalError, vec![text.as_bytes().to_vec()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request_with(body: &str, cookie: Option<&str>) -> ScgiRequest {
        let mut headers = HashMap::new();
        if let Some(cookie) = cookie {
            headers.insert("HTTP_COOKIE".to_string(), format!("SESSION_TOKEN={cookie}"));
        }
        ScgiRequest { headers, body: body.as_bytes().to_vec() }
    }

    #[test]
    fn unknown_token_on_non_start_message_yields_session_expired() {
        let gateway = Gateway::new(crate::config::Config {
            max_sessions: 0,
            ..Default::default()
        });
        // tag 3 is InputEval: any non-START/POLL message with no bound
        // session must bounce back as a fatal "session expired", and must
        // not enter the eval-wait (there is nothing to wait on).
        let req = request_with("request=%5B%5B3%2C%221%2B1%22%5D%5D", None);
        let body = handle(&gateway, &req);
        assert!(body.contains("session expired"), "{body}");
    }

    #[test]
    fn capacity_exhausted_on_input_start() {
        let gateway = Gateway::new(crate::config::Config {
            max_sessions: 0,
            backend_program: "true".to_string(),
            backend_args: vec![],
            ..Default::default()
        });
        let req = request_with("request=%5B%5B1%5D%5D", None);
        let body = handle(&gateway, &req);
        assert!(body.contains("maximum capacity"), "{body}");
    }

    #[test]
    fn no_request_field_drains_nothing_for_unbound_client() {
        let gateway = Gateway::new(crate::config::Config::default());
        let req = request_with("", None);
        let body = handle(&gateway, &req);
        assert!(body.ends_with("[]"));
    }
}
