//! Structured Config Edits
//!
//! Pure text transforms used by `modify_config`. Three layouts are understood:
//! - `key=value` text (properties / ini-style, `#` and `;` comments)
//! - JSON documents addressed by a dotted key path (`network.proxy.port`)
//! - XML in the shared-preferences shapes (`<string name="key">v</string>`,
//!   `<boolean name="key" value="v"/>`) or plain `<key>v</key>` elements

use std::str::FromStr;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    KeyValue,
    Json,
    Xml,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::KeyValue => "key_value",
            ConfigFormat::Json => "json",
            ConfigFormat::Xml => "xml",
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigEditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key_value" | "keyvalue" | "kv" | "properties" | "ini" | "text" => Ok(ConfigFormat::KeyValue),
            "json" => Ok(ConfigFormat::Json),
            "xml" => Ok(ConfigFormat::Xml),
            other => Err(ConfigEditError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigEditError {
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed config: {0}")]
    Malformed(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A dotted path ran into a non-object JSON value
    #[error("not an object at '{0}'")]
    NotAnObject(String),
}

/// Edited document plus the value it replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEdit {
    pub content: String,
    pub original_value: Option<String>,
}

// ============================================================================
// ENTRY POINT
// ============================================================================

pub fn apply_edit(
    content: &str,
    key: &str,
    value: &str,
    format: ConfigFormat,
) -> Result<ConfigEdit, ConfigEditError> {
    if key.trim().is_empty() {
        return Err(ConfigEditError::Malformed("empty key".to_string()));
    }

    match format {
        ConfigFormat::KeyValue => edit_key_value(content, key, value),
        ConfigFormat::Json => edit_json(content, key, value),
        ConfigFormat::Xml => edit_xml(content, key, value),
    }
}

// ============================================================================
// KEY=VALUE
// ============================================================================

fn edit_key_value(content: &str, key: &str, value: &str) -> Result<ConfigEdit, ConfigEditError> {
    if key.contains('=') || key.contains('\n') {
        return Err(ConfigEditError::Malformed(format!("invalid key '{}'", key)));
    }
    if value.contains('\n') {
        return Err(ConfigEditError::Malformed("value spans multiple lines".to_string()));
    }

    let key = key.trim();
    let mut original_value = None;
    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        let is_comment = trimmed.starts_with('#') || trimmed.starts_with(';');

        if !replaced && !is_comment {
            if let Some((k, v)) = trimmed.split_once('=') {
                if k.trim() == key {
                    let indent = &line[..line.len() - trimmed.len()];
                    original_value = Some(v.trim().to_string());
                    lines.push(format!("{}{}={}", indent, key, value));
                    replaced = true;
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    if !replaced {
        lines.push(format!("{}={}", key, value));
    }

    let mut content_out = lines.join("\n");
    if content.is_empty() || content.ends_with('\n') || !replaced {
        content_out.push('\n');
    }

    Ok(ConfigEdit {
        content: content_out,
        original_value,
    })
}

// ============================================================================
// JSON
// ============================================================================

fn edit_json(content: &str, key: &str, value: &str) -> Result<ConfigEdit, ConfigEditError> {
    let mut doc: Value = if content.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(content).map_err(|e| ConfigEditError::Malformed(e.to_string()))?
    };

    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigEditError::Malformed(format!("invalid key path '{}'", key)));
    }

    // Plain scalars ("8080", "true") keep their JSON type, anything else is a string
    let new_value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));

    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(ConfigEditError::Malformed("empty key path".to_string())),
    };

    let mut node = &mut doc;
    let mut walked = String::new();
    for segment in parents {
        let map = node
            .as_object_mut()
            .ok_or_else(|| ConfigEditError::NotAnObject(display_path(&walked)))?;
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
    }

    let map = node
        .as_object_mut()
        .ok_or_else(|| ConfigEditError::NotAnObject(display_path(&walked)))?;
    let previous = map.insert(last.to_string(), new_value);

    let mut content_out =
        serde_json::to_string_pretty(&doc).map_err(|e| ConfigEditError::Malformed(e.to_string()))?;
    if content.ends_with('\n') {
        content_out.push('\n');
    }

    Ok(ConfigEdit {
        content: content_out,
        original_value: previous.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        }),
    })
}

fn display_path(walked: &str) -> String {
    if walked.is_empty() {
        "$".to_string()
    } else {
        walked.to_string()
    }
}

// ============================================================================
// TAG MARKUP
// ============================================================================

/// How an element relates to the key being edited
enum Target {
    /// `<tag name="key" value="v"/>`, holding the current value
    ValueAttr(String),
    /// `<tag name="key">v</tag>` or `<key>v</key>`
    Content,
    Skip,
}

/// Rewrite the first element addressed by `key`. Every other event is written
/// back untouched, so comments, CDATA and layout elsewhere survive the edit.
fn edit_xml(content: &str, key: &str, value: &str) -> Result<ConfigEdit, ConfigEditError> {
    let mut reader = Reader::from_str(content);
    let mut writer = Writer::new(Vec::with_capacity(content.len() + value.len()));
    let mut original_value = None;

    loop {
        let event = reader.read_event().map_err(malformed)?;
        if original_value.is_some() {
            match event {
                Event::Eof => break,
                other => writer.write_event(other).map_err(malformed)?,
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Empty(start) => match target(&start, key)? {
                Target::ValueAttr(current) => {
                    writer
                        .write_event(Event::Empty(with_value(&start, value)?))
                        .map_err(malformed)?;
                    original_value = Some(current);
                }
                Target::Content => {
                    let end = start.to_end().into_owned();
                    writer.write_event(Event::Start(start)).map_err(malformed)?;
                    writer.write_event(Event::Text(BytesText::new(value))).map_err(malformed)?;
                    writer.write_event(Event::End(end)).map_err(malformed)?;
                    original_value = Some(String::new());
                }
                Target::Skip => writer.write_event(Event::Empty(start)).map_err(malformed)?,
            },
            Event::Start(start) => match target(&start, key)? {
                Target::ValueAttr(current) => {
                    writer
                        .write_event(Event::Start(with_value(&start, value)?))
                        .map_err(malformed)?;
                    original_value = Some(current);
                }
                Target::Content => {
                    let end = start.to_end().into_owned();
                    writer.write_event(Event::Start(start)).map_err(malformed)?;
                    let current = take_text(&mut reader, key)?;
                    writer.write_event(Event::Text(BytesText::new(value))).map_err(malformed)?;
                    writer.write_event(Event::End(end)).map_err(malformed)?;
                    original_value = Some(current);
                }
                Target::Skip => writer.write_event(Event::Start(start)).map_err(malformed)?,
            },
            other => writer.write_event(other).map_err(malformed)?,
        }
    }

    let original_value = match original_value {
        Some(v) => v,
        None => return Err(ConfigEditError::KeyNotFound(key.to_string())),
    };
    let content = String::from_utf8(writer.into_inner()).map_err(malformed)?;

    Ok(ConfigEdit {
        content,
        original_value: Some(original_value),
    })
}

fn target(start: &BytesStart, key: &str) -> Result<Target, ConfigEditError> {
    let mut named = false;
    let mut current = None;

    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        match attr.key.as_ref() {
            b"name" => named = attr.unescape_value().map_err(malformed)? == key,
            b"value" => current = Some(attr.unescape_value().map_err(malformed)?.into_owned()),
            _ => {}
        }
    }

    Ok(match (named, current) {
        (true, Some(current)) => Target::ValueAttr(current),
        (true, None) => Target::Content,
        (false, _) if start.name().as_ref() == key.as_bytes() => Target::Content,
        _ => Target::Skip,
    })
}

/// Same element with its `value` attribute replaced, attribute order kept
fn with_value(start: &BytesStart, value: &str) -> Result<BytesStart<'static>, ConfigEditError> {
    let mut rebuilt = start.to_owned();
    rebuilt.clear_attributes();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.as_ref() == b"value" {
            rebuilt.push_attribute(("value", value));
        } else {
            rebuilt.push_attribute(attr);
        }
    }
    Ok(rebuilt)
}

/// Consume the text (and CDATA) up to the element's end tag
fn take_text(reader: &mut Reader<&[u8]>, key: &str) -> Result<String, ConfigEditError> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(malformed)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(_) => return Ok(text),
            Event::Start(_) | Event::Empty(_) => {
                return Err(ConfigEditError::Malformed(format!("'{}' holds nested elements", key)))
            }
            Event::Eof => return Err(ConfigEditError::Malformed(format!("'{}' is never closed", key))),
            _ => {}
        }
    }
}

fn malformed(e: impl std::fmt::Display) -> ConfigEditError {
    ConfigEditError::Malformed(e.to_string())
}

// ============================================================================
// TESTS
// ============================================================================
