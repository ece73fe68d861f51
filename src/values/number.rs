//! Numeric assertions.

use crate::chain::{AssertionKind, Chain, Failure};

#[derive(Debug)]
pub struct NumberValue {
    chain: Chain,
    value: f64,
}

impl NumberValue {
    pub fn new(chain: Chain, value: f64) -> Self {
        Self { chain, value }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn raw(&self) -> f64 {
        self.value
    }

    pub fn alias(&mut self, name: &str) -> &mut Self {
        self.chain.set_alias(name);
        self
    }

    pub fn is_equal(&mut self, expected: f64) -> &mut Self {
        let value = self.value;
        self.chain.scoped("is_equal()", |chain| {
            if chain.failed() {
                return;
            }
            if value != expected {
                chain.fail(
                    Failure::message(AssertionKind::IsEqual, "expected numbers to be equal")
                        .with_actual(value)
                        .with_expected(expected)
                        .with_delta(value - expected),
                );
            }
        });
        self
    }

    /// Inclusive range check.
    pub fn in_range(&mut self, min: f64, max: f64) -> &mut Self {
        let value = self.value;
        self.chain.scoped("in_range()", |chain| {
            if chain.failed() {
                return;
            }
            if min > max {
                chain.fail(Failure::message(
                    AssertionKind::Usage,
                    format!("invalid range: min {min} is greater than max {max}"),
                ));
                return;
            }
            if !(min..=max).contains(&value) {
                chain.fail(
                    Failure::message(AssertionKind::InRange, "expected number to be within range")
                        .with_actual(value)
                        .with_expected(serde_json::json!([min, max])),
                );
            }
        });
        self
    }

    pub fn gt(&mut self, bound: f64) -> &mut Self {
        let value = self.value;
        self.chain.scoped("gt()", |chain| {
            if chain.failed() {
                return;
            }
            if value.partial_cmp(&bound) != Some(std::cmp::Ordering::Greater) {
                chain.fail(
                    Failure::message(AssertionKind::Gt, "expected number to be greater")
                        .with_actual(value)
                        .with_reference(bound),
                );
            }
        });
        self
    }

    pub fn lt(&mut self, bound: f64) -> &mut Self {
        let value = self.value;
        self.chain.scoped("lt()", |chain| {
            if chain.failed() {
                return;
            }
            if value.partial_cmp(&bound) != Some(std::cmp::Ordering::Less) {
                chain.fail(
                    Failure::message(AssertionKind::Lt, "expected number to be less")
                        .with_actual(value)
                        .with_reference(bound),
                );
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
    fn bounds_are_checked() {
        let (chain, handler) = test_chain();
        NumberValue::new(chain, 42.0).gt(10.0).lt(100.0).in_range(42.0, 42.0);
        assert!(handler.failures().is_empty());
    }

    #[test]
    fn out_of_range_reports_actual() {
        let (chain, handler) = test_chain();
        NumberValue::new(chain, 7.0).in_range(10.0, 20.0);

        let failures = handler.failures();
        assert_eq!(failures[0].kind, AssertionKind::InRange);
        assert_eq!(failures[0].actual, Some(serde_json::json!(7.0)));
    }

    #[test]
    fn inverted_range_is_usage_error() {
        let (chain, handler) = test_chain();
        NumberValue::new(chain, 1.0).in_range(5.0, 1.0);
        assert_eq!(handler.failures()[0].kind, AssertionKind::Usage);
    }

    #[test]
    fn nan_is_never_greater() {
        let (chain, handler) = test_chain();
        NumberValue::new(chain, f64::NAN).gt(0.0);
        assert_eq!(handler.failures()[0].kind, AssertionKind::Gt);
    }
}
