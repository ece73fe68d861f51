//! String assertions.

use crate::chain::{AssertionKind, Chain, Failure};

#[derive(Debug)]
pub struct StringValue {
    chain: Chain,
    value: String,
}

impl StringValue {
    pub fn new(chain: Chain, value: impl Into<String>) -> Self {
        Self {
            chain,
            value: value.into(),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn raw(&self) -> &str {
        &self.value
    }

    pub fn alias(&mut self, name: &str) -> &mut Self {
        self.chain.set_alias(name);
        self
    }

    pub fn is_equal(&mut self, expected: &str) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("is_equal()", |chain| {
            if chain.failed() {
                return;
            }
            if value != expected {
                chain.fail(
                    Failure::message(AssertionKind::IsEqual, "expected strings to be equal")
                        .with_actual(value.as_str())
                        .with_expected(expected),
                );
            }
        });
        self
    }

    pub fn not_equal(&mut self, unexpected: &str) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("not_equal()", |chain| {
            if chain.failed() {
                return;
            }
            if value == unexpected {
                chain.fail(
                    Failure::message(AssertionKind::NotEqual, "expected strings to differ")
                        .with_actual(value.as_str())
                        .with_expected(unexpected),
                );
            }
        });
        self
    }

    pub fn contains(&mut self, needle: &str) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("contains()", |chain| {
            if chain.failed() {
                return;
            }
            if !value.contains(needle) {
                chain.fail(
                    Failure::message(AssertionKind::ContainsSubset, "expected string to contain substring")
                        .with_actual(value.as_str())
                        .with_reference(needle),
                );
            }
        });
        self
    }

    pub fn is_empty(&mut self) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("is_empty()", |chain| {
            if chain.failed() {
                return;
            }
            if !value.is_empty() {
                chain.fail(
                    Failure::message(AssertionKind::IsEmpty, "expected string to be empty")
                        .with_actual(value.as_str()),
                );
            }
        });
        self
    }

    pub fn not_empty(&mut self) -> &mut Self {
        let value = &self.value;
        self.chain.scoped("not_empty()", |chain| {
            if chain.failed() {
                return;
            }
            if value.is_empty() {
                chain.fail(Failure::message(
                    AssertionKind::NotEmpty,
                    "expected string to be non-empty",
                ));
            }
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::test_chain;

    #[test]
    fn passing_assertions_report_success() {
        let (chain, handler) = test_chain();
        StringValue::new(chain, "hello world")
            .is_equal("hello world")
            .contains("world")
            .not_empty();

        assert!(handler.failures().is_empty());
        assert_eq!(
            handler.successes(),
            vec!["is_equal()", "contains()", "not_empty()"]
        );
    }

    #[test]
    fn only_first_failure_is_reported() {
        let (chain, handler) = test_chain();
        let mut value = StringValue::new(chain, "abc");
        value.is_equal("xyz").contains("q").is_empty();

        assert!(value.chain().failed());
        let failures = handler.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, AssertionKind::IsEqual);
        assert_eq!(failures[0].expected, Some("xyz".into()));
    }

    #[test]
    fn alias_shows_in_failure_context() {
        let (chain, handler) = test_chain();
        StringValue::new(chain, "").alias("token").not_empty();

        match &handler.events()[0] {
            crate::chain::Event::Failure(ctx, _) => {
                assert_eq!(ctx.alias_string(), "token.not_empty()");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
