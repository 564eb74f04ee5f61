//! Conditions prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    access::AccessResult,
    context::{CompanySummary, UserContext},
    discounts::{DiscountType, IntegrityViolation, RuleDiscount},
    errors::ConditionsError,
    projector::{ConditionView, RuleProjector, RuleView},
    records::{
        AssignmentRecord, CompanyRecord, CompanyUuid, ConditionRecord, ConditionUuid,
        ConditionWithRules, MembershipRecord, RuleKind, RuleRecord, RuleUuid, UserRecord,
        UserUuid,
    },
    resolver::{AssociationResolver, Identity, ResolvedConditions},
    service::{ConditionsService, StoreConditionsService},
    store::{EntityStore, InMemoryEntityStore, StoreError},
    uuids::TypedUuid,
    validity::is_effective,
};
