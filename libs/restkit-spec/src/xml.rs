//! XML codec producing and consuming the object shape the composite spec uses
//!
//! The shape follows the common `xml2js` conventions:
//!
//! * the root element is dropped, its content becomes the value
//! * attributes are collected under `$`
//! * text of an element that also has attributes or children goes under `_`
//! * repeated child elements collapse into an array
//! * a leaf element becomes its text, an empty element becomes `""`

use crate::error::{Result, SerializationError};
use crate::value::{Map, Value};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

pub const ATTRIBUTES_KEY: &str = "$";
pub const CHARACTER_KEY: &str = "_";

#[derive(Default)]
struct Frame {
    name: String,
    attributes: Map,
    children: Map,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| SerializationError::xml(e.to_string()))?
            .to_owned();
        let mut attributes = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| SerializationError::xml(e.to_string()))?;
            let key = std::str::from_utf8(attribute.key.as_ref())
                .map_err(|e| SerializationError::xml(e.to_string()))?
                .to_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| SerializationError::xml(e.to_string()))?;
            attributes.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn close(self) -> (String, Value) {
        let text = if self.text.trim().is_empty() {
            String::new()
        } else {
            self.text
        };
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, Value::String(text));
        }
        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_owned(), Value::Object(self.attributes));
        }
        if !text.is_empty() {
            object.insert(CHARACTER_KEY.to_owned(), Value::String(text));
        }
        object.extend(self.children);
        (self.name, Value::Object(object))
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }
}

/// Parse an XML document into a [`Value`]
///
/// # Errors
/// Returns [`SerializationError::Xml`] for malformed documents or documents
/// without a root element.
pub fn parse_xml(text: &str) -> Result<Value> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SerializationError::xml(e.to_string()))?;
        match event {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => return Ok(value),
                }
            }
            Event::Text(content) => {
                if let Some(frame) = stack.last_mut() {
                    let unescaped = content
                        .unescape()
                        .map_err(|e| SerializationError::xml(e.to_string()))?;
                    frame.text.push_str(&unescaped);
                }
            }
            Event::CData(content) => {
                if let Some(frame) = stack.last_mut() {
                    let raw = String::from_utf8(content.into_inner().into_owned())
                        .map_err(|e| SerializationError::xml(e.to_string()))?;
                    frame.text.push_str(&raw);
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    return Err(SerializationError::xml("unexpected closing tag"));
                };
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => return Ok(value),
                }
            }
            Event::Eof => {
                return Err(SerializationError::xml(if stack.is_empty() {
                    "document has no root element"
                } else {
                    "unexpected end of document"
                }));
            }
            _ => {}
        }
    }
}

/// Render `value` as an XML document whose root element is `root_name`
///
/// # Errors
/// Returns [`SerializationError::Xml`] if the writer fails.
pub fn stringify_xml(value: &Value, root_name: &str) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(|e| SerializationError::xml(e.to_string()))?;
    write_element(&mut writer, root_name, value)?;
    String::from_utf8(writer.into_inner()).map_err(|e| SerializationError::xml(e.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        Value::Object(object) => {
            let mut start = BytesStart::new(name);
            if let Some(attributes) = object.get(ATTRIBUTES_KEY).and_then(Value::as_object) {
                for (key, attribute) in attributes {
                    start.push_attribute((key.as_str(), scalar_text(attribute).as_str()));
                }
            }
            let text = object.get(CHARACTER_KEY).map(scalar_text);
            let children: Vec<(&String, &Value)> = object
                .iter()
                .filter(|(key, _)| key.as_str() != ATTRIBUTES_KEY && key.as_str() != CHARACTER_KEY)
                .collect();
            if children.is_empty() && text.as_deref().is_none_or(str::is_empty) {
                return write(writer, Event::Empty(start));
            }
            write(writer, Event::Start(start))?;
            if let Some(text) = text {
                write(writer, Event::Text(BytesText::new(&text)))?;
            }
            for (key, child) in children {
                write_element(writer, key, child)?;
            }
            write(writer, Event::End(BytesEnd::new(name)))
        }
        scalar => {
            let text = scalar_text(scalar);
            if text.is_empty() {
                return write(writer, Event::Empty(BytesStart::new(name)));
            }
            write(writer, Event::Start(BytesStart::new(name)))?;
            write(writer, Event::Text(BytesText::new(&text)))?;
            write(writer, Event::End(BytesEnd::new(name)))
        }
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| SerializationError::xml(e.to_string()))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => match other.to_json() {
            serde_json::Value::String(text) => text,
            json => json.to_string(),
        },
    }
}
