//! A minimal SCGI request/response adapter.
//!
//! SCGI frames a request as a netstring of null-separated header
//! key/value pairs (`"<len>:" header_bytes "," body_bytes`), where
//! `header_bytes` always contains `CONTENT_LENGTH` telling the reader how
//! many body bytes follow. This is the smallest correct implementation of
//! that envelope - just enough to recover the `Cookie` header and a
//! urlencoded form body, matching the adapter boundary `spec.md` draws
//! around the real HTTP/SCGI parser. A production deployment would swap
//! this module for a vetted `scgi` crate without touching anything in
//! `crate::gateway` or `crate::http::dispatcher`.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use percent_encoding::percent_decode_str;

/// One decoded SCGI request: its CGI-style headers and raw body bytes.
pub struct ScgiRequest {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ScgiRequest {
    pub fn cookie(&self, name: &str) -> Option<String> {
        let raw = self.headers.get("HTTP_COOKIE")?;
        raw.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    /// Looks up `name` in the body, treated as
    /// `application/x-www-form-urlencoded`, and percent-decodes the value.
    /// A literal `+` decodes to a space, per the form-encoding convention
    /// (plain percent-decoding alone does not do this).
    pub fn form_field(&self, name: &str) -> Option<String> {
        let body = std::str::from_utf8(&self.body).ok()?;
        body.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != name {
                return None;
            }
            let value = value.replace('+', " ");
            percent_decode_str(&value).decode_utf8().ok().map(|s| s.into_owned())
        })
    }
}

/// Reads one SCGI request off `stream`. Blocks until the full header
/// netstring and declared `CONTENT_LENGTH` body have arrived.
pub fn read_request<R: Read>(stream: &mut R) -> io::Result<ScgiRequest> {
    let header_len = read_netstring_length(stream)?;

    let mut header_bytes = vec![0u8; header_len];
    stream.read_exact(&mut header_bytes)?;

    let mut comma = [0u8; 1];
    stream.read_exact(&mut comma)?;
    if comma[0] != b',' {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing SCGI header terminator"));
    }

    let headers = parse_headers(&header_bytes)?;
    let content_length: usize = headers
        .get("CONTENT_LENGTH")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body)?;

    Ok(ScgiRequest { headers, body })
}

fn read_netstring_length<R: Read>(stream: &mut R) -> io::Result<usize> {
    let mut digits = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        match byte[0] {
            b':' => break,
            b'0'..=b'9' => digits.push(byte[0]),
            _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed SCGI length prefix")),
        }
        if digits.len() > 9 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "SCGI length prefix too long"));
        }
    }
    std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty SCGI length prefix"))
}

fn parse_headers(bytes: &[u8]) -> io::Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    let mut fields = bytes.split(|&b| b == 0).filter(|s| !s.is_empty());
    while let Some(key) = fields.next() {
        let Some(value) = fields.next() else { break };
        headers.insert(String::from_utf8_lossy(key).into_owned(), String::from_utf8_lossy(value).into_owned());
    }
    Ok(headers)
}

/// Writes a full HTTP response for `body`, setting the session cookie.
pub fn write_response<W: Write>(stream: &mut W, token: &str, body: &str) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=UTF-8\r\nSet-Cookie: SESSION_TOKEN={token}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn netstring(extra_headers: &[(&str, &str)], body: &str) -> Vec<u8> {
        let mut header_bytes = Vec::new();
        let content_length = body.len().to_string();
        for (k, v) in std::iter::once(("CONTENT_LENGTH", content_length.as_str())).chain(extra_headers.iter().copied())
        {
            header_bytes.extend_from_slice(k.as_bytes());
            header_bytes.push(0);
            header_bytes.extend_from_slice(v.as_bytes());
            header_bytes.push(0);
        }
        let mut out = format!("{}:", header_bytes.len()).into_bytes();
        out.extend_from_slice(&header_bytes);
        out.push(b',');
        out.extend_from_slice(body.as_bytes());
        out
    }

    #[test]
    fn reads_headers_and_body() {
        let raw = netstring(&[("HTTP_COOKIE", "SESSION_TOKEN=abc; other=1")], "request=hi");
        let mut cursor = Cursor::new(raw);
        let req = read_request(&mut cursor).unwrap();
        assert_eq!(req.body, b"request=hi");
        assert_eq!(req.cookie("SESSION_TOKEN").as_deref(), Some("abc"));
        assert_eq!(req.cookie("other").as_deref(), Some("1"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn form_field_percent_decodes() {
        let req = ScgiRequest {
            headers: HashMap::new(),
            body: b"request=%5B%5B1%5D%5D&other=a+b".to_vec(),
        };
        assert_eq!(req.form_field("request").as_deref(), Some("[[1]]"));
        assert_eq!(req.form_field("other").as_deref(), Some("a b"));
        assert_eq!(req.form_field("missing"), None);
    }

    #[test]
    fn rejects_non_digit_length_prefix() {
        let mut cursor = Cursor::new(b"abc:xyz,".to_vec());
        assert!(read_request(&mut cursor).is_err());
    }
}
