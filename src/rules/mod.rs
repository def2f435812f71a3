//! Credential eligibility rules
//!
//! Rules run against the claims gathered by attestation. A rule that does
//! not hold makes the holder ineligible, which is a validation failure and is
//! never retried.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use vci_model::{Claims, CredentialRuleDefinition, IssuanceError};

use crate::mapping;

/// Rule type name for [`ExpressionRule`].
pub const EXPRESSION_RULE_TYPE: &str = "expression";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Geq,
    Lt,
    Leq,
}

impl Operator {
    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Geq | Self::Lt | Self::Leq)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Geq => "geq",
            Self::Lt => "lt",
            Self::Leq => "leq",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "gt" => Ok(Self::Gt),
            "geq" => Ok(Self::Geq),
            "lt" => Ok(Self::Lt),
            "leq" => Ok(Self::Leq),
            other => Err(format!("unknown operator: {}", other)),
        }
    }
}

/// Compare the claim at `claim` against a fixed value.
///
/// `eq`/`neq` compare string renderings, so `"3"` equals `3`. Ordering
/// operators compare integers only; a non-integer claim does not satisfy
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRule {
    pub claim: String,
    pub operator: Operator,
    pub value: Value,
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ExpressionRule {
    pub fn from_definition(definition: &CredentialRuleDefinition) -> Result<Self, IssuanceError> {
        let config = &definition.configuration;
        let invalid = |detail: &str| {
            IssuanceError::validation(format!("expression rule: {}", detail))
        };

        let claim = config
            .get("claim")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("configuration.claim is required"))?;
        let operator: Operator = config
            .get("operator")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("configuration.operator is required"))?
            .parse()
            .map_err(|e: String| invalid(&e))?;
        let value = config
            .get("value")
            .cloned()
            .ok_or_else(|| invalid("configuration.value is required"))?;

        if operator.is_ordering() && as_integer(&value).is_none() {
            return Err(invalid(&format!(
                "operator '{}' needs an integer value, got {}",
                operator, value
            )));
        }

        Ok(Self {
            claim: claim.to_string(),
            operator,
            value,
        })
    }

    pub fn evaluate(&self, claims: &Claims) -> Result<(), IssuanceError> {
        let actual = mapping::lookup(claims, &self.claim)
            .map_err(|segment| IssuanceError::missing_claim(&self.claim, segment))?;

        let holds = match self.operator {
            Operator::Eq => render(actual) == render(&self.value),
            Operator::Neq => render(actual) != render(&self.value),
            op => match (as_integer(actual), as_integer(&self.value)) {
                (Some(a), Some(b)) => match op {
                    Operator::Gt => a > b,
                    Operator::Geq => a >= b,
                    Operator::Lt => a < b,
                    _ => a <= b,
                },
                _ => false,
            },
        };

        if holds {
            Ok(())
        } else {
            Err(IssuanceError::with_data(
                vci_model::FailureKind::Validation,
                format!(
                    "rule not satisfied: {} {} {} (actual {})",
                    self.claim, self.operator, self.value, actual
                ),
                serde_json::json!({ "claim": self.claim, "operator": self.operator }),
            ))
        }
    }
}

/// Evaluate every rule in order, stopping at the first that does not hold.
pub fn evaluate_rules(rules: &[CredentialRuleDefinition], claims: &Claims) -> Result<(), IssuanceError> {
    for definition in rules {
        match definition.rule_type.as_str() {
            EXPRESSION_RULE_TYPE => ExpressionRule::from_definition(definition)?.evaluate(claims)?,
            other => {
                return Err(IssuanceError::validation(format!(
                    "unknown credential rule type '{}'",
                    other
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vci_model::FailureKind;

    fn rule(claim: &str, operator: &str, value: Value) -> CredentialRuleDefinition {
        CredentialRuleDefinition {
            rule_type: EXPRESSION_RULE_TYPE.to_string(),
            configuration: json!({"claim": claim, "operator": operator, "value": value})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn claims() -> Claims {
        json!({"person": {"age": 30, "country": "DE"}, "level": "3"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_equality_compares_renderings() {
        let c = claims();
        assert!(evaluate_rules(&[rule("person.country", "eq", json!("DE"))], &c).is_ok());
        assert!(evaluate_rules(&[rule("level", "eq", json!(3))], &c).is_ok());
        assert!(evaluate_rules(&[rule("person.country", "neq", json!("FR"))], &c).is_ok());
        assert!(evaluate_rules(&[rule("person.country", "neq", json!("DE"))], &c).is_err());
    }

    #[test]
    fn test_ordering_operators() {
        let c = claims();
        assert!(evaluate_rules(&[rule("person.age", "gt", json!(18))], &c).is_ok());
        assert!(evaluate_rules(&[rule("person.age", "geq", json!(30))], &c).is_ok());
        assert!(evaluate_rules(&[rule("person.age", "lt", json!(30))], &c).is_err());
        assert!(evaluate_rules(&[rule("person.age", "leq", json!("30"))], &c).is_ok());
    }

    #[test]
    fn test_ordering_on_non_integer_claim_fails() {
        let c = claims();
        let err = evaluate_rules(&[rule("person.country", "gt", json!(1))], &c).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
    }

    #[test]
    fn test_missing_claim_is_validation() {
        let err = evaluate_rules(&[rule("person.email", "eq", json!("x"))], &claims()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert!(err.message.contains("person.email"));
    }

    #[test]
    fn test_bad_configuration_rejected() {
        assert!(ExpressionRule::from_definition(&rule("a", "between", json!(1))).is_err());
        assert!(ExpressionRule::from_definition(&rule("a", "gt", json!("ten"))).is_err());
    }

    #[test]
    fn test_unknown_rule_type() {
        let definition = CredentialRuleDefinition {
            rule_type: "script".into(),
            configuration: Claims::new(),
        };
        let err = evaluate_rules(&[definition], &claims()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
    }

    #[test]
    fn test_first_failing_rule_stops() {
        let rules = [
            rule("person.age", "lt", json!(18)),
            rule("missing", "eq", json!(1)),
        ];
        let err = evaluate_rules(&rules, &claims()).unwrap_err();
        assert!(err.message.contains("rule not satisfied"));
    }
}
