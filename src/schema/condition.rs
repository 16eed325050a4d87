/// Trigger conditions — a closed `variable operator literal` grammar.
///
/// Conditions never execute arbitrary code: a condition is exactly one
/// comparison against one declared variable.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::{Value, VarKind};
use crate::core::state::StateError;

/// A comparison or membership operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    NotIn,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

/// A parsed trigger condition.
///
/// The literal is kept as raw text and interpreted according to the
/// variable's declared kind when the condition is checked or evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: Operator,
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(String),
}

impl Condition {
    /// Parse a condition string.
    ///
    /// Syntax:
    /// - `trust_alice >= 50` — variable, comparison, literal
    /// - `ledger in revealed_secrets` — literal, membership, set variable
    /// - `ledger not in revealed_secrets`
    /// - `"two words" in revealed_secrets` — quoted literal
    pub fn parse(input: &str) -> Result<Condition, StateError> {
        let malformed = |reason: &str| StateError::MalformedCondition {
            text: input.to_string(),
            reason: reason.to_string(),
        };

        let tokens = tokenize(input).map_err(|reason| malformed(&reason))?;

        match tokens.as_slice() {
            [Token::Word(var), Token::Op(op), literal] => {
                let operator = Operator::from_symbol(op)
                    .ok_or_else(|| malformed(&format!("unknown operator '{}'", op)))?;
                let literal = match literal {
                    Token::Word(w) | Token::Quoted(w) => w.clone(),
                    Token::Op(_) => return Err(malformed("expected a literal after the operator")),
                };
                Self::build(input, var, operator, literal)
            }
            [literal, Token::Word(kw), Token::Word(var)] if kw == "in" => {
                let literal = literal_text(literal).ok_or_else(|| malformed("expected a literal before 'in'"))?;
                Self::build(input, var, Operator::In, literal)
            }
            [literal, Token::Word(not), Token::Word(kw), Token::Word(var)]
                if not == "not" && kw == "in" =>
            {
                let literal =
                    literal_text(literal).ok_or_else(|| malformed("expected a literal before 'not in'"))?;
                Self::build(input, var, Operator::NotIn, literal)
            }
            [] => Err(malformed("empty condition")),
            _ => Err(malformed(
                "expected 'variable op literal' or 'literal [not] in variable'",
            )),
        }
    }

    fn build(
        input: &str,
        variable: &str,
        operator: Operator,
        literal: String,
    ) -> Result<Condition, StateError> {
        if !is_identifier(variable) {
            return Err(StateError::MalformedCondition {
                text: input.to_string(),
                reason: format!("'{}' is not a valid variable name", variable),
            });
        }
        Ok(Condition {
            variable: variable.to_string(),
            operator,
            literal,
        })
    }

    /// Statically check that this condition is well-typed for a variable
    /// of the given kind.
    pub fn check(&self, kind: VarKind) -> Result<(), StateError> {
        self.evaluate(&kind.zero()).map(|_| ())
    }

    /// Evaluate against the variable's current value.
    pub fn evaluate(&self, value: &Value) -> Result<bool, StateError> {
        match (value, self.operator) {
            (Value::Number(n), op) if !op.is_membership() => {
                let literal = self
                    .literal
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| self.mismatch(VarKind::Number))?;
                Ok(match op {
                    Operator::Lt => *n < literal,
                    Operator::Le => *n <= literal,
                    Operator::Gt => *n > literal,
                    Operator::Ge => *n >= literal,
                    Operator::Eq => (*n - literal).abs() < f64::EPSILON,
                    _ => (*n - literal).abs() >= f64::EPSILON,
                })
            }
            (Value::Bool(b), Operator::Eq | Operator::Ne) => {
                let literal = match self.literal.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(self.mismatch(VarKind::Bool)),
                };
                Ok((*b == literal) == (self.operator == Operator::Eq))
            }
            (Value::String(s), Operator::Eq | Operator::Ne) => {
                Ok((*s == self.literal) == (self.operator == Operator::Eq))
            }
            (Value::Set(items), Operator::In | Operator::NotIn) => {
                Ok(items.contains(&self.literal) == (self.operator == Operator::In))
            }
            (other, _) => Err(StateError::TypeMismatch {
                variable: self.variable.clone(),
                expected: format!("a variable supporting '{}'", self.operator.symbol()),
                found: other.kind().name().to_string(),
            }),
        }
    }

    fn mismatch(&self, kind: VarKind) -> StateError {
        StateError::TypeMismatch {
            variable: self.variable.clone(),
            expected: format!("{} literal", kind.name()),
            found: format!("'{}'", self.literal),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let literal = if self.literal.chars().any(char::is_whitespace) || self.literal.is_empty() {
            format!("\"{}\"", self.literal)
        } else {
            self.literal.clone()
        };
        if self.operator.is_membership() {
            write!(f, "{} {} {}", literal, self.operator.symbol(), self.variable)
        } else {
            write!(f, "{} {} {}", self.variable, self.operator.symbol(), literal)
        }
    }
}

fn literal_text(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) | Token::Quoted(w) => Some(w.clone()),
        Token::Op(_) => None,
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '!')
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' {
            let start = i + 1;
            let mut end = start;
            while end < len && chars[end] != '"' {
                end += 1;
            }
            if end >= len {
                return Err("unclosed quote".to_string());
            }
            tokens.push(Token::Quoted(chars[start..end].iter().collect()));
            i = end + 1;
        } else if is_operator_char(c) {
            let start = i;
            while i < len && is_operator_char(chars[i]) {
                i += 1;
            }
            let op: String = chars[start..i].iter().collect();
            if Operator::from_symbol(&op).is_none() {
                return Err(format!("unknown operator '{}'", op));
            }
            tokens.push(Token::Op(op));
        } else {
            let start = i;
            while i < len && !chars[i].is_whitespace() && !is_operator_char(chars[i]) && chars[i] != '"'
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_comparison() {
        let c = Condition::parse("trust_alice >= 50").unwrap();
        assert_eq!(c.variable, "trust_alice");
        assert_eq!(c.operator, Operator::Ge);
        assert_eq!(c.literal, "50");
    }

    #[test]
    fn parse_without_whitespace() {
        let c = Condition::parse("courage>70").unwrap();
        assert_eq!(c.variable, "courage");
        assert_eq!(c.operator, Operator::Gt);
        assert_eq!(c.literal, "70");
    }

    #[test]
    fn parse_negative_literal() {
        let c = Condition::parse("trust < -5").unwrap();
        assert_eq!(c.literal, "-5");
        assert!(c.evaluate(&Value::Number(-6.0)).unwrap());
    }

    #[test]
    fn parse_membership() {
        let c = Condition::parse("ledger in revealed_secrets").unwrap();
        assert_eq!(c.variable, "revealed_secrets");
        assert_eq!(c.operator, Operator::In);
        assert_eq!(c.literal, "ledger");

        let c = Condition::parse("\"burned letter\" not in revealed_secrets").unwrap();
        assert_eq!(c.operator, Operator::NotIn);
        assert_eq!(c.literal, "burned letter");
    }

    #[test]
    fn parse_errors() {
        for bad in [
            "",
            "courage",
            "courage >",
            "courage => 5",
            "courage === 5",
            "50 < courage extra",
            "\"unclosed in secrets",
            "9lives == 3",
            "ledger in",
        ] {
            assert!(
                matches!(Condition::parse(bad), Err(StateError::MalformedCondition { .. })),
                "expected '{}' to be malformed",
                bad
            );
        }
    }

    #[test]
    fn evaluate_numbers() {
        let value = Value::Number(80.0);
        assert!(Condition::parse("courage > 70").unwrap().evaluate(&value).unwrap());
        assert!(Condition::parse("courage <= 80").unwrap().evaluate(&value).unwrap());
        assert!(Condition::parse("courage == 80").unwrap().evaluate(&value).unwrap());
        assert!(!Condition::parse("courage != 80").unwrap().evaluate(&value).unwrap());
        assert!(!Condition::parse("courage < 10").unwrap().evaluate(&value).unwrap());
    }

    #[test]
    fn evaluate_bool_and_string() {
        let c = Condition::parse("alarm_raised == true").unwrap();
        assert!(c.evaluate(&Value::Bool(true)).unwrap());
        assert!(!c.evaluate(&Value::Bool(false)).unwrap());

        let c = Condition::parse("act != ACT1").unwrap();
        assert!(c.evaluate(&Value::String("ACT2".into())).unwrap());
        assert!(!c.evaluate(&Value::String("ACT1".into())).unwrap());
    }

    #[test]
    fn evaluate_sets() {
        let secrets = Value::set_of(["ledger", "poison"]);
        assert!(Condition::parse("ledger in revealed_secrets").unwrap().evaluate(&secrets).unwrap());
        assert!(Condition::parse("will not in revealed_secrets").unwrap().evaluate(&secrets).unwrap());
    }

    #[test]
    fn check_rejects_mismatches() {
        assert!(Condition::parse("courage > brave").unwrap().check(VarKind::Number).is_err());
        assert!(Condition::parse("alarm == maybe").unwrap().check(VarKind::Bool).is_err());
        assert!(Condition::parse("act < ACT2").unwrap().check(VarKind::String).is_err());
        assert!(Condition::parse("secrets == x").unwrap().check(VarKind::Set).is_err());
        assert!(Condition::parse("x in courage").unwrap().check(VarKind::Number).is_err());
        assert!(Condition::parse("courage >= 1.5").unwrap().check(VarKind::Number).is_ok());
    }

    #[test]
    fn non_finite_number_literals_rejected() {
        for text in ["courage > NaN", "courage < inf", "courage >= -infinity"] {
            let c = Condition::parse(text).unwrap();
            assert!(
                matches!(c.check(VarKind::Number), Err(StateError::TypeMismatch { .. })),
                "expected '{}' to be rejected",
                text
            );
            assert!(c.evaluate(&Value::Number(50.0)).is_err());
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        for text in ["courage >= 70", "ledger not in revealed_secrets", "act == ACT2"] {
            let c = Condition::parse(text).unwrap();
            assert_eq!(c.to_string(), text);
            assert_eq!(Condition::parse(&c.to_string()).unwrap(), c);
        }
    }
}
