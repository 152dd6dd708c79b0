//! Decide whether an advisor reply is conversational text, an advice card or
//! an action.
//!
//! Models are unreliable about formatting: JSON arrives bare, wrapped in a
//! fenced block, or buried in prose. All three extraction strategies live in
//! one chain here, and every candidate must pass a shallow schema check.
//! Anything that fails falls closed to plain text.

use serde_json::{Map, Value, json};
use std::sync::LazyLock;

use crate::action::{ActionEnvelope, AgentAction};
use crate::types::{Advice, Priority, RuleAlignment};

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Text(String),
    Advice(Advice),
    Action(ActionEnvelope),
}

impl Interpretation {
    /// Shown when the generating call itself fails.
    pub fn processing_error() -> Self {
        Self::Advice(Advice::processing_error())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Advice(_) => "advice",
            Self::Action(_) => "action",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Direct,
    Fenced,
    BraceSpan,
}

static ENVELOPE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "properties": {
            "type": {"type": "string"},
            "message": {"type": "string"}
        }
    })
});

static ADVICE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "properties": {
            "title": {"type": "string"},
            "content": {"type": "string"},
            "category": {"type": "string"},
            "priority": {"type": "string"},
            "actionItems": {"type": "array"},
            "ruleAlignment": {"type": "number"}
        }
    })
});

static ACTION_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "properties": {
            "parameters": {"type": "object"},
            "confirmationRequired": {"type": "boolean"},
            "confirmationMessage": {"type": "string"}
        }
    })
});

pub fn classify(raw: &str) -> Interpretation {
    if !raw.contains('{') && !raw.contains("\"type\"") {
        return Interpretation::Text(raw.to_owned());
    }

    for (source, candidate) in candidates(raw) {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        if let Some(found) = interpret(&obj) {
            tracing::debug!(?source, kind = found.kind(), "advisor reply classified");
            return found;
        }
    }

    tracing::debug!(preview = %preview(raw, 120), "no structured payload, treating reply as text");
    Interpretation::Text(raw.to_owned())
}

/// Extraction chain in priority order: the whole reply, each fenced block,
/// then the span from the first `{` to the last `}`.
fn candidates(raw: &str) -> Vec<(Source, &str)> {
    let trimmed = raw.trim();
    let mut out = vec![(Source::Direct, trimmed)];
    out.extend(fenced_blocks(trimmed).into_iter().map(|b| (Source::Fenced, b)));
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        out.push((Source::BraceSpan, &trimmed[start..=end]));
    }
    out
}

/// Bodies of ``` fenced blocks; the info string after the opening fence is skipped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim());
        rest = &body[close + 3..];
    }
    blocks
}

fn interpret(obj: &Map<String, Value>) -> Option<Interpretation> {
    let value = Value::Object(obj.clone());
    if !conforms(&value, &ENVELOPE_SCHEMA) {
        return None;
    }
    match obj.get("type").and_then(Value::as_str).map(str::to_lowercase).as_deref() {
        None | Some("advice") => {
            let body = match obj.get("advice") {
                Some(Value::Object(inner)) => inner,
                _ => obj,
            };
            if !conforms(&Value::Object(body.clone()), &ADVICE_SCHEMA) {
                return None;
            }
            advice_from(body).map(Interpretation::Advice)
        }
        Some("action") => {
            let body = obj.get("action").filter(|v| v.is_object()).unwrap_or(&value);
            if !conforms(body, &ACTION_SCHEMA) {
                return None;
            }
            let action = AgentAction::from_payload(&value)?;
            let message = ["message", "response", "text"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_owned);
            Some(Interpretation::Action(ActionEnvelope { action, message }))
        }
        Some(other) => {
            tracing::debug!(kind = other, "unsupported payload type");
            None
        }
    }
}

/// Lenient advice reader. At least a title or content is required; other
/// fields take defaults when absent or unrecognized.
fn advice_from(obj: &Map<String, Value>) -> Option<Advice> {
    let text = |k: &str| obj.get(k).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty());
    let title = text("title");
    let content = text("content").or_else(|| text("advice"));
    if title.is_none() && content.is_none() {
        return None;
    }
    Some(Advice {
        title: title.unwrap_or_default().to_owned(),
        content: content.unwrap_or_default().to_owned(),
        category: text("category").map(str::to_owned).unwrap_or_else(|| "General".into()),
        priority: text("priority").and_then(Priority::parse_loose).unwrap_or_default(),
        action_items: obj
            .get("actionItems")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
            .unwrap_or_default(),
        rule_alignment: obj
            .get("ruleAlignment")
            .and_then(Value::as_i64)
            .map(RuleAlignment::clamped),
    })
}

/// Shallow check: an object whose declared `properties` have the declared
/// JSON types. Presence is left to the readers, which accept key aliases.
fn conforms(input: &Value, schema: &Value) -> bool {
    if !input.is_object() {
        return false;
    }
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop) in props {
            if let Some(value) = input.get(key)
                && !value.is_null()
                && let Some(type_name) = prop.get("type").and_then(Value::as_str)
                && !matches_json_type(value, type_name)
            {
                tracing::debug!(
                    key = key.as_str(),
                    expected_type = type_name,
                    actual = %preview(&value.to_string(), 80),
                    "payload schema check failed"
                );
                return false;
            }
        }
    }
    true
}

fn matches_json_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn preview(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;

    #[test]
    fn plain_text_passes_through_unchanged() {
        for raw in ["Hello there!", "  spaced out  ", "", "a \"quoted\" word", "ünïcödé"] {
            assert_eq!(classify(raw), Interpretation::Text(raw.to_owned()));
        }
    }

    #[test]
    fn direct_action_json() {
        let raw = r#"{"type":"action","message":"On it","action":{"actionType":"CREATE_TASK","parameters":{"title":"Call mom"}}}"#;
        let Interpretation::Action(env) = classify(raw) else {
            panic!("expected action");
        };
        assert_eq!(env.action.action_type, ActionType::CreateTask);
        assert_eq!(env.message.as_deref(), Some("On it"));
        assert_eq!(env.action.parameters["title"], "Call mom");
    }

    #[test]
    fn action_type_is_preserved_for_every_known_type() {
        for t in ActionType::ALL {
            let raw = json!({"type": "action", "action": {"actionType": t.as_str(), "parameters": {}}}).to_string();
            match classify(&raw) {
                Interpretation::Action(env) => assert_eq!(env.action.action_type, t),
                other => panic!("{t}: {other:?}"),
            }
        }
    }

    #[test]
    fn fenced_advice() {
        let raw = "Here you go:\n```json\n{\"type\":\"advice\",\"title\":\"Sleep\",\"content\":\"Go to bed earlier\",\"priority\":\"HIGH\",\"actionItems\":[\"Set alarm\"]}\n```\nGood luck";
        let Interpretation::Advice(advice) = classify(raw) else {
            panic!("expected advice");
        };
        assert_eq!(advice.title, "Sleep");
        assert_eq!(advice.priority, Priority::High);
        assert_eq!(advice.action_items, vec!["Set alarm".to_string()]);
        assert_eq!(advice.category, "General");
    }

    #[test]
    fn brace_span_inside_prose() {
        let raw = "Sure! {\"type\": \"action\", \"actionType\": \"navigate\", \"parameters\": {\"page\": \"habits\"}} Let me know.";
        let Interpretation::Action(env) = classify(raw) else {
            panic!("expected action");
        };
        assert_eq!(env.action.action_type, ActionType::Navigate);
    }

    #[test]
    fn missing_type_means_advice() {
        let Interpretation::Advice(a) = classify(r#"{"title":"Hydrate","content":"Drink water"}"#) else {
            panic!("expected advice");
        };
        assert_eq!(a.content, "Drink water");
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let raw = "I think {this is not json} really";
        assert_eq!(classify(raw), Interpretation::Text(raw.to_owned()));
    }

    #[test]
    fn schema_violations_fail_closed() {
        let cases = [
            r#"{"type":"action","action":{"actionType":"CREATE_TASK","parameters":"title=x"}}"#,
            r#"{"type":"action"}"#,
            r#"{"type":"advice","title":42}"#,
            r#"{"type":"greeting","content":"hi"}"#,
            r#"{"unrelated":true}"#,
            r#"[1, 2, 3]"#,
        ];
        for raw in cases {
            assert_eq!(classify(raw), Interpretation::Text(raw.to_owned()), "{raw}");
        }
    }

    #[test]
    fn schema_checks_types_of_present_keys_only() {
        assert!(conforms(&json!({"actionType": "NAVIGATE"}), &ACTION_SCHEMA));
        assert!(conforms(&json!({"parameters": {}, "confirmationRequired": null}), &ACTION_SCHEMA));
        assert!(!conforms(&json!({"confirmationRequired": "yes"}), &ACTION_SCHEMA));
        assert!(!conforms(&json!("not an object"), &ENVELOPE_SCHEMA));
    }

    #[test]
    fn first_valid_candidate_wins() {
        let raw = "```\n{\"type\":\"advice\",\"title\":\"Fenced\"}\n```\n{\"type\":\"advice\",\"title\":\"Loose\"}";
        let Interpretation::Advice(a) = classify(raw) else {
            panic!("expected advice");
        };
        assert_eq!(a.title, "Fenced");
    }

    #[test]
    fn processing_error_card() {
        let Interpretation::Advice(a) = Interpretation::processing_error() else {
            panic!("expected advice");
        };
        assert_eq!(a.title, "Processing Error");
    }
}
