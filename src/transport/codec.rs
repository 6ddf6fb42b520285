//! XML-RPC message encoding and decoding
//!
//! Requests are written as plain strings with escaped text content.
//! Responses are read with the quick-xml event reader into a small element
//! tree first, which is then interpreted as XML-RPC values.

use super::TransportError;
use crate::value::{Struct, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader;
use quick_xml::escape::{escape, resolve_predefined_entity, unescape};
use quick_xml::events::Event;

/// Encodes a method call as an XML-RPC request document
pub(super) fn encode_call(method: &str, params: &[Value]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        write_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>");
    xml
}

fn write_value(xml: &mut String, value: &Value) {
    xml.push_str("<value>");
    match value {
        Value::Nil => xml.push_str("<nil/>"),
        Value::Bool(b) => {
            xml.push_str(if *b { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" })
        }
        Value::Int(i) if i32::try_from(*i).is_ok() => {
            xml.push_str(&format!("<int>{}</int>", i));
        }
        Value::Int(i) => xml.push_str(&format!("<i8>{}</i8>", i)),
        Value::Double(d) => xml.push_str(&format!("<double>{}</double>", d)),
        Value::String(s) => {
            xml.push_str("<string>");
            xml.push_str(&escape(s.as_str()));
            xml.push_str("</string>");
        }
        Value::DateTime(s) => {
            xml.push_str("<dateTime.iso8601>");
            xml.push_str(&escape(s.as_str()));
            xml.push_str("</dateTime.iso8601>");
        }
        Value::Base64(bytes) => {
            xml.push_str("<base64>");
            xml.push_str(&STANDARD.encode(bytes));
            xml.push_str("</base64>");
        }
        Value::Struct(members) => {
            xml.push_str("<struct>");
            for (name, member) in members {
                xml.push_str("<member><name>");
                xml.push_str(&escape(name.as_str()));
                xml.push_str("</name>");
                write_value(xml, member);
                xml.push_str("</member>");
            }
            xml.push_str("</struct>");
        }
        Value::Array(elements) => {
            xml.push_str("<array><data>");
            for element in elements {
                write_value(xml, element);
            }
            xml.push_str("</data></array>");
        }
    }
    xml.push_str("</value>");
}

/// Decodes an XML-RPC response document
///
/// A `<fault>` response is returned as [`TransportError::Fault`].
pub(super) fn decode_response(xml: &str) -> Result<Value, TransportError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(codec_error(format!(
            "expected <methodResponse>, found <{}>",
            root.name
        )));
    }

    let body = root
        .children
        .first()
        .ok_or_else(|| codec_error("empty <methodResponse>"))?;

    match body.name.as_str() {
        "params" => {
            let value = body.child("param")?.child("value")?;
            decode_value(value)
        }
        "fault" => {
            let fault = decode_value(body.child("value")?)?;
            Err(TransportError::Fault {
                code: fault
                    .get("faultCode")
                    .and_then(Value::coerce_i64)
                    .unwrap_or_default(),
                message: fault
                    .get("faultString")
                    .and_then(Value::coerce_string)
                    .unwrap_or_default(),
            })
        }
        other => Err(codec_error(format!("unexpected <{}> in response", other))),
    }
}

fn decode_value(element: &Element) -> Result<Value, TransportError> {
    // An untyped value is a string
    let Some(typed) = element.children.first() else {
        return Ok(Value::String(element.text.clone()));
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "i4" | "int" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| codec_error(format!("invalid integer '{}'", text))),
        "boolean" => match text {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(codec_error(format!("invalid boolean '{}'", text))),
        },
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| codec_error(format!("invalid double '{}'", text))),
        "string" => Ok(Value::String(typed.text.clone())),
        "dateTime.iso8601" => Ok(Value::DateTime(text.to_string())),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Base64)
                .map_err(|e| codec_error(format!("invalid base64: {}", e)))
        }
        "nil" => Ok(Value::Nil),
        "struct" => {
            let mut members = Struct::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.child("name")?.text.clone();
                let value = decode_value(member.child("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        "array" => typed
            .child("data")?
            .children
            .iter()
            .filter(|c| c.name == "value")
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(codec_error(format!("unsupported value type <{}>", other))),
    }
}

/// A parsed XML element with its child elements and concatenated text
#[derive(Debug, Default)]
struct Element {
    name: String,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn new(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Result<&Element, TransportError> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| codec_error(format!("missing <{}> in <{}>", name, self.name)))
    }
}

fn parse_tree(xml: &str) -> Result<Element, TransportError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::new(e.name().as_ref())),
            Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Element::new(e.name().as_ref())),
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| codec_error("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&t);
                    let text = unescape(&raw).map_err(|e| codec_error(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                let resolved = match r.resolve_char_ref() {
                    Ok(Some(ch)) => ch.to_string(),
                    Ok(None) => {
                        let name = String::from_utf8_lossy(&r);
                        resolve_predefined_entity(&name)
                            .ok_or_else(|| codec_error(format!("unknown entity &{};", name)))?
                            .to_string()
                    }
                    Err(e) => return Err(codec_error(e.to_string())),
                };
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&resolved);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(codec_error(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(codec_error("unexpected end of document"));
    }
    root.ok_or_else(|| codec_error("empty document"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn codec_error(message: impl Into<String>) -> TransportError {
    TransportError::Codec(message.into())
}
