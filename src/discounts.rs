//! Discounts
//!
//! Discount rules carry a type and a value next to their expression. The store hands
//! these over as raw optional columns; [`RuleDiscount::from_parts`] is the only way to
//! turn them into a validated discount, and every rule that fails it is an upstream
//! data-integrity problem rather than a caller error.

use std::fmt::{Display, Formatter, Result as FmtResult};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for a percentage discount value.
pub const MAX_PERCENTAGE: Decimal = Decimal::ONE_HUNDRED;

/// Upper bound for the length of a rule expression, in characters.
pub const MAX_EXPRESSION_LEN: usize = 2000;

/// How a discount value is applied by the pricing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Value is a percentage in `0..=100`.
    Percentage,

    /// Value is a fixed amount.
    Fixed,
}

impl DiscountType {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "percentage" => Some(Self::Percentage),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

impl Display for DiscountType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A validated discount attached to a discount rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleDiscount {
    /// Discount type
    #[serde(rename = "type")]
    pub kind: DiscountType,

    /// Non-negative discount value, at most [`MAX_PERCENTAGE`] for percentages
    pub value: Decimal,
}

impl RuleDiscount {
    /// Validate the raw discount columns of a discount rule.
    ///
    /// # Errors
    ///
    /// Returns an [`IntegrityViolation`] when either part is missing, the value is
    /// negative, or a percentage exceeds [`MAX_PERCENTAGE`].
    pub fn from_parts(
        kind: Option<DiscountType>,
        value: Option<Decimal>,
    ) -> Result<Self, IntegrityViolation> {
        let kind = kind.ok_or(IntegrityViolation::MissingDiscountType)?;
        let value = value.ok_or(IntegrityViolation::MissingDiscountValue)?;

        if value.is_sign_negative() && !value.is_zero() {
            return Err(IntegrityViolation::NegativeDiscountValue(value));
        }

        if kind == DiscountType::Percentage && value > MAX_PERCENTAGE {
            return Err(IntegrityViolation::PercentageOutOfRange(value));
        }

        Ok(Self { kind, value })
    }
}

/// Malformed rule data found while projecting. Logged and the rule skipped; never
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    /// A discount rule has no discount type.
    #[error("discount rule is missing its discount type")]
    MissingDiscountType,

    /// A discount rule has no discount value.
    #[error("discount rule is missing its discount value")]
    MissingDiscountValue,

    /// A discount value below zero.
    #[error("discount value {0} is negative")]
    NegativeDiscountValue(Decimal),

    /// A percentage discount above 100.
    #[error("percentage discount {0} exceeds {MAX_PERCENTAGE}")]
    PercentageOutOfRange(Decimal),

    /// The expression string is longer than [`MAX_EXPRESSION_LEN`] characters.
    #[error("expression is {0} characters long, limit is {MAX_EXPRESSION_LEN}")]
    ExpressionTooLong(usize),
}

/// Check the expression length limit.
///
/// # Errors
///
/// Returns [`IntegrityViolation::ExpressionTooLong`] when the limit is exceeded.
pub fn check_expression(expression: &str) -> Result<(), IntegrityViolation> {
    let len = expression.chars().count();

    if len > MAX_EXPRESSION_LEN {
        return Err(IntegrityViolation::ExpressionTooLong(len));
    }

    Ok(())
}
