//! Response body encoders: json, wrapped_json and python, with the
//! optional fixed16 status preamble.
//!
//! The wire format keeps one row per line even inside JSON arrays so
//! streaming consumers can process large results line by line.

use std::fmt::Write as _;

use serde_json::Value as Json;

use lqd_common::LqdError;

use crate::request::{OutputFormat, Request};
use crate::response::Response;

/// Encodes a finished response according to the request's output options.
#[must_use]
pub fn encode_response(req: &Request, response: &Response) -> Vec<u8> {
    let body = match req.effective_output_format() {
        OutputFormat::Json => encode_json(req, response),
        OutputFormat::WrappedJson => encode_wrapped_json(req, response),
        OutputFormat::Python => encode_python(req, response),
    };
    frame(req.response_fixed16, response.code, body)
}

/// Encodes an error reply: the message as the body, status from the error.
#[must_use]
pub fn encode_error(fixed16: bool, err: &LqdError) -> Vec<u8> {
    let body = format!("{}\n", err);
    frame(fixed16, err.response_code(), body)
}

fn frame(fixed16: bool, code: u16, body: String) -> Vec<u8> {
    if !fixed16 {
        return body.into_bytes();
    }
    let mut out = format!("{:03} {:11}\n", code, body.len());
    out.push_str(&body);
    out.into_bytes()
}

fn encode_json(req: &Request, response: &Response) -> String {
    let mut out = String::from("[");
    let mut first = true;
    if req.send_columns_header {
        out.push_str(&serde_json::to_string(&response.columns).expect("string array"));
        out.push('\n');
        first = false;
    }
    for row in &response.result {
        if !first {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(row).expect("json cells"));
        out.push('\n');
        first = false;
    }
    out.push_str("]\n");
    out
}

fn encode_wrapped_json(req: &Request, response: &Response) -> String {
    let mut out = String::from("{\"data\":[");
    let mut first = true;
    for row in &response.result {
        if !first {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(row).expect("json cells"));
        out.push('\n');
        first = false;
    }
    out.push_str("]\n");
    let _ = write!(out, ",\"total\":{}", response.total);
    let _ = write!(
        out,
        ",\"failed\":{}",
        serde_json::to_string(&response.failed).expect("string map")
    );
    if req.send_columns_header {
        let _ = write!(
            out,
            ",\"columns\":{}",
            serde_json::to_string(&response.columns).expect("string array")
        );
    }
    out.push_str("}\n");
    out
}

fn encode_python(req: &Request, response: &Response) -> String {
    let mut out = String::from("[");
    let mut first = true;
    if req.send_columns_header {
        let header: Vec<Json> = response
            .columns
            .iter()
            .map(|name| Json::String(name.clone()))
            .collect();
        out.push_str(&python_value(&Json::Array(header)));
        out.push('\n');
        first = false;
    }
    for row in &response.result {
        if !first {
            out.push(',');
        }
        out.push('[');
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&python_value(cell));
        }
        out.push(']');
        out.push('\n');
        first = false;
    }
    out.push_str("]\n");
    out
}

/// Renders a JSON value as a Python literal.
fn python_value(value: &Json) -> String {
    match value {
        Json::Null => "None".to_string(),
        Json::Bool(true) => "True".to_string(),
        Json::Bool(false) => "False".to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => python_string(s),
        Json::Array(items) => {
            let rendered: Vec<String> = items.iter().map(python_value).collect();
            format!("[{}]", rendered.join(","))
        }
        Json::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_string(k), python_value(v)))
                .collect();
            format!("{{{}}}", rendered.join(","))
        }
    }
}

fn python_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\x00"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn sample_response() -> Response {
        Response {
            code: 200,
            result: vec![
                vec![json!("testhost_1"), json!(0)],
                vec![json!("testhost_2"), json!(1)],
            ],
            failed: HashMap::new(),
            columns: vec!["name".to_string(), "state".to_string()],
            total: 2,
        }
    }

    fn req(text: &str) -> Request {
        Request::parse(text, &lqd_schema::Catalog::new()).unwrap()
    }

    #[test]
    fn test_json_rows_are_line_separated() {
        let body = encode_response(&req("GET hosts\n\n"), &sample_response());
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text, "[[\"testhost_1\",0]\n,[\"testhost_2\",1]\n]\n");
        let parsed: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([["testhost_1", 0], ["testhost_2", 1]]));
    }

    #[test]
    fn test_column_headers_row() {
        let body = encode_response(&req("GET hosts\nColumnHeaders: on\n\n"), &sample_response());
        let parsed: Json = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed[0], json!(["name", "state"]));
        assert_eq!(parsed[1], json!(["testhost_1", 0]));
    }

    #[test]
    fn test_wrapped_json_shape() {
        let mut response = sample_response();
        response
            .failed
            .insert("mockid1".to_string(), "connection refused".to_string());
        let body = encode_response(
            &req("GET hosts\nOutputFormat: wrapped_json\nColumnHeaders: on\n\n"),
            &response,
        );
        let parsed: Json = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["total"], json!(2));
        assert_eq!(parsed["data"][0], json!(["testhost_1", 0]));
        assert_eq!(parsed["failed"]["mockid1"], json!("connection refused"));
        assert_eq!(parsed["columns"], json!(["name", "state"]));
    }

    #[test]
    fn test_fixed16_header() {
        let body = encode_response(&req("GET hosts\nResponseHeader: fixed16\n\n"), &sample_response());
        let text = String::from_utf8(body).unwrap();
        let (header, rest) = text.split_at(16);
        assert_eq!(&header[..3], "200");
        assert_eq!(header.chars().nth(3), Some(' '));
        assert!(header.ends_with('\n'));
        let length: usize = header[4..15].trim().parse().unwrap();
        assert_eq!(length, rest.len());
    }

    #[test]
    fn test_error_encoding() {
        let err = LqdError::TableNotFound {
            table: "none".to_string(),
        };
        let body = encode_error(true, &err);
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("404 "));
        assert!(text.ends_with("bad request: table none does not exist\n"));
    }

    #[test]
    fn test_python_rendering() {
        let response = Response {
            code: 200,
            result: vec![vec![
                json!("o'brien"),
                json!(1.5),
                json!([1, 2]),
                json!({"TAGS": "prod"}),
            ]],
            failed: HashMap::new(),
            columns: vec![],
            total: 1,
        };
        let body = encode_response(&req("GET hosts\nOutputFormat: python\n\n"), &response);
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text, "[['o\\'brien',1.5,[1,2],{'TAGS': 'prod'}]\n]\n");
    }
}
