//! Dynamic evaluation context for rule conditions.
//!
//! A context is a JSON-like tree. Conditions address values with dotted
//! paths (`event.actor`, `tags.region`, `samples.0`). A key that itself
//! contains dots (`cpu.usage`) is matched literally before the path is split.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    root: Map<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.root.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Resolve a dotted path to a value, `None` when any segment is missing
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.root.get(path) {
            return Some(value);
        }
        resolve_in_map(&self.root, path)
    }

    /// Resolve a path and read it as a number
    pub fn number(&self, path: &str) -> Option<f64> {
        self.resolve(path).and_then(Value::as_f64)
    }

    /// Resolve a path and read it as a string
    pub fn text(&self, path: &str) -> Option<&str> {
        self.resolve(path).and_then(Value::as_str)
    }

    /// Replace `{path}` placeholders with resolved values.
    /// Unresolvable placeholders are left as written.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let path = &after[..close];
                    match self.resolve(path) {
                        Some(Value::String(s)) => out.push_str(s),
                        Some(value) => out.push_str(&value.to_string()),
                        None => {
                            out.push('{');
                            out.push_str(path);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

impl From<Map<String, Value>> for EvaluationContext {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

fn resolve_in_map<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    // Try progressively shorter literal prefixes so keys with dots still resolve
    let mut split_at = path.len();
    while let Some(dot) = path[..split_at].rfind('.') {
        let (head, tail) = (&path[..dot], &path[dot + 1..]);
        if let Some(child) = map.get(head) {
            if let Some(found) = resolve_in_value(child, tail) {
                return Some(found);
            }
        }
        split_at = dot;
    }
    None
}

fn resolve_in_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(path).or_else(|| resolve_in_map(map, path)),
        Value::Array(items) => {
            let (head, tail) = match path.split_once('.') {
                Some((head, tail)) => (head, Some(tail)),
                None => (path, None),
            };
            let item = items.get(head.parse::<usize>().ok()?)?;
            match tail {
                Some(tail) => resolve_in_value(item, tail),
                None => Some(item),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EvaluationContext {
        EvaluationContext::new()
            .with("cpu.usage", 0.5)
            .with("event", json!({"type": "task_blocked", "actor": {"id": "agent-7"}}))
            .with("samples", json!([1.0, 2.0, {"value": 3.0}]))
    }

    #[test]
    fn test_resolves_nested_paths() {
        let ctx = sample();
        assert_eq!(ctx.text("event.type"), Some("task_blocked"));
        assert_eq!(ctx.text("event.actor.id"), Some("agent-7"));
        assert_eq!(ctx.number("samples.1"), Some(2.0));
        assert_eq!(ctx.number("samples.2.value"), Some(3.0));
    }

    #[test]
    fn test_dotted_key_matches_literally() {
        assert_eq!(sample().number("cpu.usage"), Some(0.5));
    }

    #[test]
    fn test_missing_paths_resolve_to_none() {
        let ctx = sample();
        assert!(ctx.resolve("event.target").is_none());
        assert!(ctx.resolve("samples.9").is_none());
        assert!(ctx.resolve("event.type.inner").is_none());
    }

    #[test]
    fn test_render_template() {
        let ctx = sample();
        assert_eq!(
            ctx.render("Task Blocked: {event.actor.id} ({missing})"),
            "Task Blocked: agent-7 ({missing})"
        );
        assert_eq!(ctx.render("cpu at {cpu.usage}"), "cpu at 0.5");
    }
}
