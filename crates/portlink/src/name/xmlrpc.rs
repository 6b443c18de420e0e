// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal XML-RPC client for talking to a ROS master.
//!
//! Requests are HTTP/1.0 POSTs with a hand-written `methodCall` body;
//! responses are parsed with `roxmltree`. Values map onto bottles:
//!
//! | XML-RPC            | Bottle                 |
//! |--------------------|------------------------|
//! | int, i4, boolean   | `Value::Int`           |
//! | double             | `Value::Float`         |
//! | string, untyped    | `Value::Str`           |
//! | array              | `Value::List`          |
//! | struct             | list of `(name value)` |
//!
//! A fault becomes `(faultCode N) (faultString "...")`.

use std::io::{Read, Write};
use std::time::Duration;

use roxmltree::{Document, Node};

use super::NameError;
use crate::bottle::{Bottle, Value};
use crate::stream::SocketStream;

/// Upper bound for an HTTP response body.
const MAX_RESPONSE_LEN: usize = 16 * 1024 * 1024;

/// Call `method` on `host:port` and return the decoded response value.
///
/// A response that is an array is returned as its elements; any other
/// value is returned as a one-element bottle.
pub fn call(
    host: &str,
    port: u16,
    method: &str,
    params: &Bottle,
    timeout: Option<Duration>,
) -> Result<Bottle, NameError> {
    let addr = format!("{}:{}", host, port);
    let body = encode_call(method, params);
    let request = format!(
        "POST /RPC2 HTTP/1.0\r\n\
         User-Agent: portlink\r\n\
         Host: {}\r\n\
         Content-Type: text/xml\r\n\
         Content-Length: {}\r\n\r\n{}",
        addr,
        body.len(),
        body
    );

    let mut stream = SocketStream::connect(&addr, timeout)
        .map_err(|e| NameError::Unreachable(format!("{}: {}", addr, e)))?;
    stream.get_ref().set_read_timeout(timeout)?;
    stream.get_ref().set_write_timeout(timeout)?;
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut response = Vec::new();
    Read::by_ref(&mut stream)
        .take(MAX_RESPONSE_LEN as u64)
        .read_to_end(&mut response)?;
    log::trace!("[xmlrpc] {} -> {} bytes", method, response.len());

    let text = String::from_utf8_lossy(&response);
    let body = http_body(&text)?;
    parse_response(body)
}

fn http_body(response: &str) -> Result<&str, NameError> {
    let (head, body) = response
        .split_once("\r\n\r\n")
        .or_else(|| response.split_once("\n\n"))
        .ok_or_else(|| NameError::BadReply("no HTTP header terminator".into()))?;
    let status = head.lines().next().unwrap_or("");
    let code = status.split_whitespace().nth(1).unwrap_or("");
    if code != "200" {
        return Err(NameError::BadReply(format!("HTTP status {:?}", status)));
    }
    Ok(body)
}

// ============================================================================
// Encoding
// ============================================================================

/// `<methodCall>` document for `method` with one param per bottle element.
pub fn encode_call(method: &str, params: &Bottle) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    escape_into(&mut out, method);
    out.push_str("</methodName>\n<params>\n");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>\n");
    }
    out.push_str("</params></methodCall>\n");
    out
}

/// `<methodResponse>` document returning `value` as an array.
pub fn encode_response(value: &Bottle) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param>");
    encode_value(&mut out, &Value::List(value.clone()));
    out.push_str("</param></params></methodResponse>\n");
    out
}

/// `<methodResponse>` fault document.
pub fn encode_fault(code: i64, message: &str) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\"?>\n<methodResponse><fault><value><struct>\
         <member><name>faultCode</name>",
    );
    encode_value(&mut out, &Value::Int(code));
    out.push_str("</member><member><name>faultString</name>");
    encode_value(&mut out, &Value::Str(message.to_string()));
    out.push_str("</member></struct></value></fault></methodResponse>\n");
    out
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(v) => {
            out.push_str(&format!("<i4>{}</i4>", v));
        }
        Value::Float(v) => {
            out.push_str(&format!("<double>{}</double>", v));
        }
        Value::Str(s) => {
            out.push_str("<string>");
            escape_into(out, s);
            out.push_str("</string>");
        }
        Value::List(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
    }
    out.push_str("</value>");
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a `<methodResponse>` document.
pub fn parse_response(body: &str) -> Result<Bottle, NameError> {
    let doc = Document::parse(body.trim())
        .map_err(|e| NameError::BadReply(format!("invalid XML-RPC response: {}", e)))?;
    let root = doc.root_element();
    if root.tag_name().name() != "methodResponse" {
        return Err(NameError::BadReply(format!(
            "expected methodResponse, got {}",
            root.tag_name().name()
        )));
    }

    if let Some(fault) = child(root, "fault") {
        let value = child(fault, "value")
            .ok_or_else(|| NameError::BadReply("fault without value".into()))?;
        let decoded = decode_value(value)?;
        let fields = decoded.as_list().cloned().unwrap_or_default();
        let code = fields.find("faultCode").and_then(Value::as_int).unwrap_or(-1);
        let message = fields
            .find("faultString")
            .map(Value::to_plain_string)
            .unwrap_or_default();
        let mut out = Bottle::new();
        out.push_pair("faultCode", code).push_pair("faultString", message);
        return Ok(out);
    }

    let value = child(root, "params")
        .and_then(|p| child(p, "param"))
        .and_then(|p| child(p, "value"))
        .ok_or_else(|| NameError::BadReply("response without params".into()))?;
    match decode_value(value)? {
        Value::List(items) => Ok(items),
        other => Ok(Bottle::new().with(other)),
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn decode_value(value: Node) -> Result<Value, NameError> {
    let Some(typed) = value.children().find(|n| n.is_element()) else {
        // Untyped values are strings.
        return Ok(Value::Str(value.text().unwrap_or("").to_string()));
    };
    let text = typed.text().unwrap_or("");
    let bad = |kind: &str| NameError::BadReply(format!("bad {} {:?}", kind, text));
    match typed.tag_name().name() {
        "int" | "i4" | "i8" => text.trim().parse().map(Value::Int).map_err(|_| bad("int")),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Int(1)),
            "0" | "false" => Ok(Value::Int(0)),
            _ => Err(bad("boolean")),
        },
        "double" => text
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| bad("double")),
        "string" => Ok(Value::Str(text.to_string())),
        "nil" => Ok(Value::Str(String::new())),
        "array" => {
            let data = child(typed, "data").ok_or_else(|| bad("array"))?;
            let items = data
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "value")
                .map(decode_value)
                .collect::<Result<Bottle, _>>()?;
            Ok(Value::List(items))
        }
        "struct" => {
            let mut out = Bottle::new();
            for member in typed
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "member")
            {
                let name = child(member, "name")
                    .and_then(|n| n.text())
                    .ok_or_else(|| bad("struct member"))?;
                let value = child(member, "value").ok_or_else(|| bad("struct member"))?;
                out.push(Bottle::new().with(name).with(decode_value(value)?));
            }
            Ok(Value::List(out))
        }
        other => Err(NameError::BadReply(format!("unsupported XML-RPC type {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call() {
        let params = Bottle::new()
            .with("/node")
            .with("/a&b")
            .with(Bottle::new().with(1).with(2));
        let xml = encode_call("registerPublisher", &params);
        assert!(xml.contains("<methodName>registerPublisher</methodName>"));
        assert!(xml.contains("<string>/a&amp;b</string>"));
        assert!(xml.contains("<array><data><value><i4>1</i4></value><value><i4>2</i4></value></data></array>"));
    }

    #[test]
    fn test_parse_ros_style_reply() {
        let body = "<?xml version='1.0'?>\n<methodResponse><params><param><value><array><data>\
            <value><int>1</int></value>\
            <value><string>ok</string></value>\
            <value><array><data><value>http://host:4000/</value></data></array></value>\
            </data></array></value></param></params></methodResponse>";
        let reply = parse_response(body).unwrap();
        assert_eq!(reply.get_int(0), Some(1));
        assert_eq!(reply.get_str(1), Some("ok"));
        let pubs = reply.get(2).and_then(Value::as_list).unwrap();
        assert_eq!(pubs.get_str(0), Some("http://host:4000/"));
    }

    #[test]
    fn test_fault_maps_to_bottle() {
        let reply = parse_response(&encode_fault(-7, "bad topic")).unwrap();
        assert_eq!(reply.find("faultCode").and_then(Value::as_int), Some(-7));
        assert_eq!(reply.find("faultString").and_then(Value::as_str), Some("bad topic"));
    }

    #[test]
    fn test_response_round_trip_with_struct_and_bool() {
        let body = "<methodResponse><params><param><value><struct>\
            <member><name>ok</name><value><boolean>1</boolean></value></member>\
            <member><name>ratio</name><value><double>0.5</double></value></member>\
            </struct></value></param></params></methodResponse>";
        let reply = parse_response(body).unwrap();
        let fields = reply.get(0).and_then(Value::as_list).unwrap();
        assert_eq!(fields.find("ok").and_then(Value::as_int), Some(1));
        assert_eq!(fields.find("ratio").and_then(Value::as_float), Some(0.5));

        let echoed = parse_response(&encode_response(&Bottle::new().with(1).with("x"))).unwrap();
        assert_eq!(echoed.to_text(), "1 x");
    }

    #[test]
    fn test_bad_documents() {
        assert!(parse_response("not xml").is_err());
        assert!(parse_response("<other/>").is_err());
        assert!(http_body("HTTP/1.0 404 Not Found\r\n\r\n").is_err());
        assert_eq!(http_body("HTTP/1.1 200 OK\r\nA: b\r\n\r\nbody").unwrap(), "body");
    }
}
