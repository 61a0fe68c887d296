use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, QspError};

/// Script value: a 64-bit integer or a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    Number(i64),
    Text(String),
}

impl Default for Variant {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Script truth: `-1` for true, `0` for false.
impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Self::Number(if value { -1 } else { 0 })
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Parses decimal text the way script conversions do: surrounding blanks are
/// ignored, one optional sign, then digits only. Blank text reads as zero.
pub fn parse_number(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    let (negative, digits) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let mut value: i64 = 0;
    for byte in digits.bytes() {
        value = value
            .saturating_mul(10)
            .saturating_add(i64::from(byte - b'0'));
    }
    Some(if negative { -value } else { value })
}

/// `isnum` semantics: like [`parse_number`] but blank text is not a number.
pub fn is_numeric_text(text: &str) -> bool {
    !text.trim().is_empty() && parse_number(text).is_some()
}

fn numeric_operand(value: &Variant, op: &str) -> Result<i64, QspError> {
    value.try_to_number().ok_or_else(|| {
        QspError::new(
            ErrorKind::TypeMismatch,
            format!("Operator \"{}\" expects a number, got \"{}\".", op, value),
        )
    })
}

impl Variant {
    pub fn empty(text: bool) -> Self {
        if text {
            Self::Text(String::new())
        } else {
            Self::Number(0)
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn try_to_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => parse_number(value),
        }
    }

    /// Numeric view of the value; text that does not parse yields 0.
    pub fn to_number(&self) -> i64 {
        self.try_to_number().unwrap_or(0)
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Number(value) => value.to_string(),
        }
    }

    pub fn is_truthy(&self) -> Result<bool, QspError> {
        Ok(numeric_operand(self, "condition")? != 0)
    }

    /// Converts to the slot type of a variable (`$name` slots hold text).
    pub fn coerce(self, text: bool) -> Result<Self, QspError> {
        match (self, text) {
            (Self::Text(value), true) => Ok(Self::Text(value)),
            (Self::Number(value), true) => Ok(Self::Text(value.to_string())),
            (Self::Number(value), false) => Ok(Self::Number(value)),
            (Self::Text(value), false) => parse_number(&value).map(Self::Number).ok_or_else(|| {
                QspError::new(
                    ErrorKind::TypeMismatch,
                    format!("Cannot store text \"{}\" in a numeric variable.", value),
                )
            }),
        }
    }

    /// `+`: integer sum when both sides are numeric, concatenation otherwise.
    pub fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => Self::Number(left.wrapping_add(*right)),
            (Self::Text(left), Self::Text(right)) => Self::Text(format!("{}{}", left, right)),
            _ => match (self.try_to_number(), other.try_to_number()) {
                (Some(left), Some(right)) => Self::Number(left.wrapping_add(right)),
                _ => Self::Text(format!("{}{}", self, other)),
            },
        }
    }

    pub fn sub(&self, other: &Self) -> Result<Self, QspError> {
        let left = numeric_operand(self, "-")?;
        let right = numeric_operand(other, "-")?;
        Ok(Self::Number(left.wrapping_sub(right)))
    }

    pub fn mul(&self, other: &Self) -> Result<Self, QspError> {
        let left = numeric_operand(self, "*")?;
        let right = numeric_operand(other, "*")?;
        Ok(Self::Number(left.wrapping_mul(right)))
    }

    pub fn div(&self, other: &Self) -> Result<Self, QspError> {
        let left = numeric_operand(self, "/")?;
        let right = numeric_operand(other, "/")?;
        if right == 0 {
            return Err(QspError::from_kind(ErrorKind::DivByZero));
        }
        Ok(Self::Number(left.wrapping_div(right)))
    }

    pub fn modulo(&self, other: &Self) -> Result<Self, QspError> {
        let left = numeric_operand(self, "mod")?;
        let right = numeric_operand(other, "mod")?;
        if right == 0 {
            return Err(QspError::from_kind(ErrorKind::DivByZero));
        }
        Ok(Self::Number(left.wrapping_rem(right)))
    }

    pub fn negate(&self) -> Result<Self, QspError> {
        Ok(Self::Number(numeric_operand(self, "-")?.wrapping_neg()))
    }

    pub fn concat(&self, other: &Self) -> Self {
        Self::Text(format!("{}{}", self, other))
    }

    /// Ordering used by comparison operators, `min` and `max`: numeric when
    /// both sides read as numbers, lexicographic on the text form otherwise.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self.try_to_number(), other.try_to_number()) {
            (Some(left), Some(right)) => left.cmp(&right),
            _ => self.to_text().cmp(&other.to_text()),
        }
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn parse_number_accepts_signs_and_blanks() {
        assert_eq!(parse_number(" 42 "), Some(42));
        assert_eq!(parse_number("-7"), Some(-7));
        assert_eq!(parse_number("+3"), Some(3));
        assert_eq!(parse_number(""), Some(0));
        assert_eq!(parse_number("4a"), None);
        assert_eq!(parse_number("-"), None);
        assert!(!is_numeric_text(""));
        assert!(is_numeric_text("12"));
    }

    #[test]
    fn to_number_defaults_to_zero_for_non_numeric_text() {
        assert_eq!(Variant::from("abc").to_number(), 0);
        assert_eq!(Variant::from("15").to_number(), 15);
        assert_eq!(Variant::Number(9).to_text(), "9");
    }

    #[test]
    fn add_sums_numbers_and_concatenates_text() {
        assert_eq!(
            Variant::Number(1).add(&Variant::Number(2)),
            Variant::Number(3)
        );
        assert_eq!(
            Variant::from("a").add(&Variant::from("b")),
            Variant::from("ab")
        );
        assert_eq!(Variant::from("4").add(&Variant::Number(1)), Variant::Number(5));
        assert_eq!(Variant::from("x").add(&Variant::Number(1)), Variant::from("x1"));
    }

    #[test]
    fn arithmetic_rejects_non_numeric_text() {
        let error = Variant::from("a")
            .sub(&Variant::from("b"))
            .expect_err("text subtraction should fail");
        assert_eq!(error.kind, ErrorKind::TypeMismatch);
        assert_eq!(
            Variant::from("10").sub(&Variant::from("4")).expect("numeric text"),
            Variant::Number(6)
        );
    }

    #[test]
    fn division_and_modulo_by_zero_fail() {
        let error = Variant::Number(1)
            .div(&Variant::Number(0))
            .expect_err("div by zero");
        assert_eq!(error.kind, ErrorKind::DivByZero);
        let error = Variant::Number(1)
            .modulo(&Variant::Number(0))
            .expect_err("mod by zero");
        assert_eq!(error.kind, ErrorKind::DivByZero);
        assert_eq!(
            Variant::Number(7).modulo(&Variant::Number(3)).expect("mod"),
            Variant::Number(1)
        );
        assert_eq!(
            Variant::Number(i64::MIN).div(&Variant::Number(-1)).expect("wraps"),
            Variant::Number(i64::MIN)
        );
    }

    #[test]
    fn compare_is_numeric_only_when_both_sides_parse() {
        assert_eq!(Variant::from("10").compare(&Variant::from("9")), Ordering::Greater);
        assert_eq!(Variant::from("b").compare(&Variant::from("a")), Ordering::Greater);
        assert_eq!(Variant::Number(2).compare(&Variant::from("2")), Ordering::Equal);
        assert_eq!(Variant::from("abc").compare(&Variant::Number(5)), Ordering::Greater);
    }

    #[test]
    fn true_is_minus_one() {
        assert_eq!(Variant::from(true), Variant::Number(-1));
        assert_eq!(Variant::from(false), Variant::Number(0));
    }

    #[test]
    fn coerce_follows_slot_type() {
        assert_eq!(
            Variant::Number(5).coerce(true).expect("to text"),
            Variant::from("5")
        );
        assert_eq!(
            Variant::from("12").coerce(false).expect("to number"),
            Variant::Number(12)
        );
        let error = Variant::from("x")
            .coerce(false)
            .expect_err("non numeric text");
        assert_eq!(error.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn untagged_serde_keeps_json_shape() {
        let json = serde_json::to_string(&vec![Variant::Number(1), Variant::from("a")])
            .expect("serialize");
        assert_eq!(json, r#"[1,"a"]"#);
        let back: Vec<Variant> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, vec![Variant::Number(1), Variant::from("a")]);
    }
}
