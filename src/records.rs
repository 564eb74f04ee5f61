//! Records
//!
//! Plain entity records as supplied by the entity store. They are read-only inputs to
//! resolution; nothing in this crate writes them.

use std::fmt::{Display, Formatter, Result as FmtResult};

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{discounts::DiscountType, uuids::TypedUuid};

/// User UUID
pub type UserUuid = TypedUuid<UserRecord>;

/// Company UUID
pub type CompanyUuid = TypedUuid<CompanyRecord>;

/// Condition UUID
pub type ConditionUuid = TypedUuid<ConditionRecord>;

/// Rule UUID
pub type RuleUuid = TypedUuid<RuleRecord>;

/// User Record
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Unique user identifier.
    pub uuid: UserUuid,

    /// Display name.
    pub name: String,

    /// User type tag, e.g. `customer` or `sales_rep`.
    pub user_type: String,

    /// Role tags.
    pub roles: SmallVec<[String; 4]>,

    /// Activation flag.
    pub active: bool,

    /// Creation timestamp.
    pub created_at: Timestamp,

    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// Company Record
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    /// Unique company identifier.
    pub uuid: CompanyUuid,

    /// Registered legal name.
    pub legal_name: String,

    /// Trade name shown to customers.
    pub trade_name: String,

    /// Tax identifier.
    pub tax_id: String,

    /// Activation flag.
    pub active: bool,

    /// Creation timestamp.
    pub created_at: Timestamp,

    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// Membership Record, linking a user to a company.
///
/// At most one membership exists per `(user, company)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRecord {
    /// Member user.
    pub user_uuid: UserUuid,

    /// Company the user belongs to.
    pub company_uuid: CompanyUuid,

    /// Activation flag.
    pub active: bool,

    /// Creation timestamp, used to pick the most recent membership.
    pub created_at: Timestamp,
}

/// Assignment Record, granting a company a condition.
///
/// At most one assignment exists per `(company, condition)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    /// Company the condition is granted to.
    pub company_uuid: CompanyUuid,

    /// Granted condition.
    pub condition_uuid: ConditionUuid,

    /// Activation flag.
    pub active: bool,

    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// Condition Record: a named, prioritized, time-bounded bundle of rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRecord {
    /// Unique condition identifier.
    pub uuid: ConditionUuid,

    /// Condition name.
    pub name: String,

    /// Higher values are evaluated first.
    pub priority: i32,

    /// Start of the validity window, unbounded when absent.
    pub valid_from: Option<Timestamp>,

    /// End of the validity window, unbounded when absent.
    pub valid_until: Option<Timestamp>,

    /// Activation flag.
    pub active: bool,

    /// Creation timestamp.
    pub created_at: Timestamp,

    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// What a rule controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Catalog visibility rule.
    Visibility,

    /// Pricing discount rule.
    Discount,
}

impl RuleKind {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Visibility => "visibility",
            Self::Discount => "discount",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "visibility" => Some(Self::Visibility),
            "discount" => Some(Self::Discount),
            _ => None,
        }
    }
}

impl Display for RuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Rule Record
///
/// Discount columns are raw: they are only trusted after
/// [`RuleDiscount::from_parts`](crate::discounts::RuleDiscount::from_parts).
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    /// Unique rule identifier.
    pub uuid: RuleUuid,

    /// Owning condition.
    pub condition_uuid: ConditionUuid,

    /// Rule kind.
    pub kind: RuleKind,

    /// Opaque expression forwarded to external evaluators.
    pub expression: String,

    /// Higher values are evaluated first within a condition priority.
    pub priority: i32,

    /// Discount type, only meaningful for discount rules.
    pub discount_type: Option<DiscountType>,

    /// Discount value, only meaningful for discount rules.
    pub discount_value: Option<Decimal>,

    /// Activation flag.
    pub active: bool,

    /// Creation timestamp.
    pub created_at: Timestamp,

    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// A condition together with all of its rules, active or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionWithRules {
    /// The condition.
    pub condition: ConditionRecord,

    /// Every rule owned by the condition.
    pub rules: Vec<RuleRecord>,
}
