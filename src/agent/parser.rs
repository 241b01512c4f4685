use std::sync::LazyLock;

use fancy_regex::Regex;
use indexmap::IndexMap;

use super::schema::StageSchema;

/// `Heading: value`, tolerating list markers and markdown emphasis around the heading.
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*#>]+\s*)?\**\s*([^:：*]{1,48}?)\s*\**\s*[:：]\s*\**\s*(.*)$")
        .expect("field line pattern is valid")
});

const CONFIDENCE_HEADING: &str = "confidence";

/// Fields extracted from one generation.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedOutput {
    /// Extracted values keyed by field key, in schema order.
    pub fields: IndexMap<String, String>,
    /// Required keys without a value.
    pub missing: Vec<String>,
    pub confidence: f32,
}

/// Extracts a stage's fields from generated text.
///
/// A JSON object anywhere in the text takes precedence when it names at least
/// one field; otherwise `Heading: value` lines are read, with following lines
/// continuing the current value.
pub fn parse_output(text: &str, schema: &StageSchema) -> ParsedOutput {
    let (values, stated) = parse_json(text, schema).unwrap_or_else(|| parse_lines(text, schema));

    let mut fields = IndexMap::new();
    for slot in schema.fields() {
        if let Some(value) = values.get(slot.key)
            && !value.is_empty()
        {
            fields.insert(slot.key.to_owned(), value.clone());
        }
    }
    let missing = schema
        .required
        .iter()
        .filter(|f| !fields.contains_key(f.key))
        .map(|f| f.key.to_owned())
        .collect::<Vec<_>>();

    let confidence = if !missing.is_empty() {
        let present = schema.required.len() - missing.len();
        0.4 * present as f32 / schema.required.len() as f32
    } else if let Some(stated) = stated {
        stated
    } else if schema.optional.is_empty() {
        1.0
    } else {
        let present = schema
            .optional
            .iter()
            .filter(|f| fields.contains_key(f.key))
            .count();
        0.6 + 0.4 * present as f32 / schema.optional.len() as f32
    };

    ParsedOutput {
        fields,
        missing,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

type Extracted = (IndexMap<&'static str, String>, Option<f32>);

fn parse_lines(text: &str, schema: &StageSchema) -> Extracted {
    let mut values: IndexMap<&'static str, String> = IndexMap::new();
    let mut stated = None;
    let mut current: Option<&'static str> = None;

    for line in text.lines() {
        let heading = FIELD_LINE
            .captures(line)
            .ok()
            .flatten()
            .and_then(|c| Some((c.get(1)?.as_str().to_owned(), c.get(2)?.as_str().to_owned())));
        if let Some((heading, value)) = heading {
            if super::schema::normalize_heading(&heading) == CONFIDENCE_HEADING {
                stated = parse_confidence(&value);
                current = None;
                continue;
            }
            if let Some(slot) = schema.lookup(&heading) {
                let value = value.trim().trim_end_matches("**").trim();
                values.insert(slot.key, value.to_owned());
                current = Some(slot.key);
                continue;
            }
        }
        if let Some(key) = current {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            if let Some(value) = values.get_mut(key) {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(line.trim());
            }
        }
    }
    (values, stated)
}

fn parse_json(text: &str, schema: &StageSchema) -> Option<Extracted> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let object = match serde_json::from_str::<serde_json::Value>(&text[start..=end]).ok()? {
        serde_json::Value::Object(object) => object,
        _ => return None,
    };

    let mut values = IndexMap::new();
    let mut stated = None;
    for (heading, value) in object.iter() {
        if super::schema::normalize_heading(heading) == CONFIDENCE_HEADING {
            stated = match value {
                serde_json::Value::Number(n) => n.as_f64().map(normalize_confidence),
                serde_json::Value::String(s) => parse_confidence(s),
                _ => None,
            };
            continue;
        }
        if let Some(slot) = schema.lookup(heading) {
            values.insert(slot.key, json_text(value));
        }
    }
    (!values.is_empty()).then_some((values, stated))
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_owned(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accepts `0.8`, `80%` and `80`.
fn parse_confidence(value: &str) -> Option<f32> {
    let value = value.trim();
    match value.strip_suffix('%') {
        Some(percent) => percent
            .trim()
            .parse::<f64>()
            .ok()
            .map(|v| (v / 100.0).clamp(0.0, 1.0) as f32),
        None => value.parse::<f64>().ok().map(normalize_confidence),
    }
}

/// Whole numbers in `(1, 100]` are percentages; anything else is clamped.
fn normalize_confidence(value: f64) -> f32 {
    let value = if value > 1.0 && value <= 100.0 && value.fract() == 0.0 {
        value / 100.0
    } else {
        value
    };
    value.clamp(0.0, 1.0) as f32
}
