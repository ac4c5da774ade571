//! The HTTP-facing layer: SCGI framing in `scgi`, the browser JSON message
//! shape in `wire_json`, and the request/response orchestration itself in
//! `dispatcher`. Nothing in `crate::gateway` or below knows this module
//! exists.

pub mod dispatcher;
pub mod scgi;
pub mod wire_json;
