//! JSON assertions and navigation.
//!
//! Navigating into a missing field or element fails the current branch and
//! returns a child holding `null`, so the caller can keep chaining without
//! producing further reports.

use serde::Serialize;
use serde_json::Value;

use crate::chain::{AssertionKind, Chain, Failure};
use crate::values::number::NumberValue;
use crate::values::string::StringValue;

#[derive(Debug)]
pub struct JsonValue {
    chain: Chain,
    value: Value,
}

impl JsonValue {
    pub fn new(chain: Chain, value: Value) -> Self {
        Self { chain, value }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    pub fn alias(&mut self, name: &str) -> &mut Self {
        self.chain.set_alias(name);
        self
    }

    /// Compare with anything serializable.
    pub fn is_equal<T: Serialize>(&mut self, expected: T) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("is_equal()", |chain| {
            if chain.failed() {
                return;
            }
            let expected = match serde_json::to_value(expected) {
                Ok(expected) => expected,
                Err(err) => {
                    chain.fail(Failure::new(AssertionKind::Usage, err));
                    return;
                }
            };
            if *value != expected {
                chain.fail(
                    Failure::message(AssertionKind::IsEqual, "expected values to be equal")
                        .with_actual(value.clone())
                        .with_expected(expected),
                );
            }
        });
        self
    }

    /// Child value for an object field.
    pub fn field(&mut self, name: &str) -> JsonValue {
        let segment = format!("field({name:?})");
        let value = &self.value;
        let child = self.chain.scoped(&segment, |chain| {
            if chain.failed() {
                return Value::Null;
            }
            match value {
                Value::Object(map) => match map.get(name) {
                    Some(child) => child.clone(),
                    None => {
                        chain.fail(
                            Failure::message(AssertionKind::ContainsKey, "expected object to contain key")
                                .with_actual(value.clone())
                                .with_reference(name),
                        );
                        Value::Null
                    }
                },
                other => {
                    chain.fail(type_failure("object", other));
                    Value::Null
                }
            }
        });
        JsonValue::new(self.chain.derive(&segment), child)
    }

    /// Child value for an array element.
    pub fn element(&mut self, index: usize) -> JsonValue {
        let segment = format!("element({index})");
        let value = &self.value;
        let child = self.chain.scoped(&segment, |chain| {
            if chain.failed() {
                return Value::Null;
            }
            match value {
                Value::Array(items) => match items.get(index) {
                    Some(item) => item.clone(),
                    None => {
                        chain.fail(
                            Failure::message(AssertionKind::InRange, "array index out of bounds")
                                .with_actual(index)
                                .with_expected(serde_json::json!([0, items.len()])),
                        );
                        Value::Null
                    }
                },
                other => {
                    chain.fail(type_failure("array", other));
                    Value::Null
                }
            }
        });
        JsonValue::new(self.chain.derive(&segment), child)
    }

    /// Run `f` on every array element, each on its own branch.
    pub fn each(&mut self, mut f: impl FnMut(&mut JsonValue)) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("each()", |chain| {
            if chain.failed() {
                return;
            }
            match value {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let mut element = JsonValue::new(chain.derive(&format!("[{i}]")), item.clone());
                        f(&mut element);
                    }
                }
                other => chain.fail(type_failure("array", other)),
            }
        });
        self
    }

    pub fn as_str(&mut self) -> StringValue {
        let value = &self.value;
        let text = self.chain.scoped("as_str()", |chain| {
            if chain.failed() {
                return String::new();
            }
            match value {
                Value::String(s) => s.clone(),
                other => {
                    chain.fail(type_failure("string", other));
                    String::new()
                }
            }
        });
        StringValue::new(self.chain.derive("as_str()"), text)
    }

    pub fn as_number(&mut self) -> NumberValue {
        let value = &self.value;
        let number = self.chain.scoped("as_number()", |chain| {
            if chain.failed() {
                return 0.0;
            }
            match value.as_f64() {
                Some(n) => n,
                None => {
                    chain.fail(type_failure("number", value));
                    0.0
                }
            }
        });
        NumberValue::new(self.chain.derive("as_number()"), number)
    }
}

fn type_failure(expected: &str, actual: &Value) -> Failure {
    Failure::message(
        AssertionKind::Type,
        format!("expected {expected}, got {}", type_name(actual)),
    )
    .with_actual(actual.clone())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::test_chain;
    use serde_json::json;

    fn user() -> Value {
        json!({"id": 7, "name": "ada", "tags": ["a", "b", ""]})
    }

    #[test]
    fn navigation_builds_paths() {
        let (chain, handler) = test_chain();
        let mut root = JsonValue::new(chain, user());
        root.field("name").as_str().is_equal("ada");
        root.field("id").as_number().is_equal(7.0);

        assert!(handler.failures().is_empty());
        assert!(handler
            .successes()
            .contains(&"field(\"name\").as_str().is_equal()".to_string()));
    }

    #[test]
    fn missing_field_fails_once() {
        let (chain, handler) = test_chain();
        let mut root = JsonValue::new(chain, user());
        let mut missing = root.field("email");
        missing.as_str().not_empty();

        assert!(missing.chain().failed());
        assert!(root.chain().failed());
        let failures = handler.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, AssertionKind::ContainsKey);
    }

    #[test]
    fn each_isolates_elements() {
        let (chain, handler) = test_chain();
        let mut root = JsonValue::new(chain, user());
        root.field("tags").each(|tag| {
            tag.as_str().not_empty();
        });

        let events = handler.events();
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                crate::chain::Event::Failure(ctx, _) => Some(ctx.path_string()),
                _ => None,
            })
            .collect();
        assert_eq!(
            failed,
            vec!["field(\"tags\").each().[2].as_str().not_empty()"]
        );
        assert!(root.chain().descendant_failed());
        assert!(!root.chain().failed());
    }

    #[test]
    fn element_out_of_bounds() {
        let (chain, handler) = test_chain();
        let mut tags = JsonValue::new(chain, json!(["x"]));
        tags.element(0).is_equal("x");
        tags.element(3).is_equal("y");

        let failures = handler.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, AssertionKind::InRange);
    }

    #[test]
    fn type_mismatch_reports_type_kind() {
        let (chain, handler) = test_chain();
        JsonValue::new(chain, json!(3)).as_str();
        let failure = &handler.failures()[0];
        assert_eq!(failure.kind, AssertionKind::Type);
        assert_eq!(failure.summary(), "expected string, got number");
    }

    #[test]
    fn is_equal_accepts_serializable() {
        let (chain, handler) = test_chain();
        JsonValue::new(chain, user())
            .field("tags")
            .is_equal(vec!["a", "b", ""]);
        assert!(handler.failures().is_empty());
    }
}
