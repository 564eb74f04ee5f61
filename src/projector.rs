//! Rule Projector
//!
//! Turns resolved conditions into ordered rule views: effective conditions only, active
//! rules of the requested kind only, malformed rules logged and skipped, sorted by
//! condition priority then rule priority (both descending) with rule uuid as the final
//! tie-break.

use std::cmp::Ordering;

use jiff::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    discounts::{IntegrityViolation, RuleDiscount, check_expression},
    errors::ConditionsError,
    records::{
        CompanyUuid, ConditionRecord, ConditionUuid, ConditionWithRules, RuleKind, RuleRecord,
        RuleUuid,
    },
    resolver::{AssociationResolver, Identity, ResolvedConditions},
    store::EntityStore,
    validity::is_effective,
};

/// A rule as handed to catalog and pricing systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleView {
    /// Rule identifier
    pub rule_uuid: RuleUuid,

    /// Owning condition identifier
    pub condition_uuid: ConditionUuid,

    /// Owning condition name
    pub condition_name: String,

    /// Owning condition priority, the primary ordering key
    pub condition_priority: i32,

    /// Rule kind
    pub kind: RuleKind,

    /// Expression, passed through verbatim
    pub expression: String,

    /// Rule priority, the secondary ordering key
    pub priority: i32,

    /// Validated discount, present for discount rules only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<RuleDiscount>,
}

/// An effective condition with its effective rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionView {
    /// Condition identifier
    pub uuid: ConditionUuid,

    /// Condition name
    pub name: String,

    /// Condition priority
    pub priority: i32,

    /// Start of the validity window
    pub valid_from: Option<Timestamp>,

    /// End of the validity window
    pub valid_until: Option<Timestamp>,

    /// Active, well-formed rules of both kinds, by rule priority descending
    pub rules: Vec<RuleView>,
}

/// Ordering of rule views: condition priority desc, rule priority desc, rule uuid asc.
pub fn rule_order(a: &RuleView, b: &RuleView) -> Ordering {
    b.condition_priority
        .cmp(&a.condition_priority)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.rule_uuid.cmp(&b.rule_uuid))
}

/// Ordering of condition views: priority desc, uuid asc.
pub fn condition_order(a: &ConditionView, b: &ConditionView) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.uuid.cmp(&b.uuid))
}

/// Projects rules out of resolved conditions at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct RuleProjector {
    now: Timestamp,
}

impl RuleProjector {
    /// Create a projector evaluating validity at `now`.
    #[must_use]
    pub const fn new(now: Timestamp) -> Self {
        Self { now }
    }

    /// The evaluation instant.
    #[must_use]
    pub const fn now(&self) -> Timestamp {
        self.now
    }

    /// Conditions effective at the evaluation instant.
    pub fn effective<'c>(
        &self,
        conditions: &'c [ConditionWithRules],
    ) -> impl Iterator<Item = &'c ConditionWithRules> + use<'c> {
        let now = self.now;

        conditions
            .iter()
            .filter(move |entry| is_effective(&entry.condition, now))
    }

    /// Ordered views of the active rules of `kind` in effective conditions.
    #[must_use]
    pub fn project(&self, conditions: &[ConditionWithRules], kind: RuleKind) -> Vec<RuleView> {
        let mut views: Vec<RuleView> = self
            .effective(conditions)
            .flat_map(|entry| {
                entry
                    .rules
                    .iter()
                    .filter(move |rule| rule.kind == kind)
                    .filter_map(move |rule| view(&entry.condition, rule))
            })
            .collect();

        views.sort_by(rule_order);

        views
    }

    /// Ordered views of effective conditions with all their effective rules.
    #[must_use]
    pub fn project_conditions(&self, conditions: &[ConditionWithRules]) -> Vec<ConditionView> {
        let mut views: Vec<ConditionView> = self
            .effective(conditions)
            .map(|entry| {
                let mut rules: Vec<RuleView> = entry
                    .rules
                    .iter()
                    .filter_map(|rule| view(&entry.condition, rule))
                    .collect();

                rules.sort_by(rule_order);

                ConditionView {
                    uuid: entry.condition.uuid,
                    name: entry.condition.name.clone(),
                    priority: entry.condition.priority,
                    valid_from: entry.condition.valid_from,
                    valid_until: entry.condition.valid_until,
                    rules,
                }
            })
            .collect();

        views.sort_by(condition_order);

        views
    }
}

/// Restrict a user's resolved conditions to those reachable from `company`.
///
/// Scoping is strict: when the user reached no active membership to `company` the result
/// is empty, even if `scope` itself is not.
#[must_use]
pub fn narrow_to_company(
    resolved: ResolvedConditions,
    company: CompanyUuid,
    scope: &ResolvedConditions,
) -> ResolvedConditions {
    if !resolved.companies.contains(&company) {
        debug!(%company, "company filter outside the user's active memberships");

        return ResolvedConditions::default();
    }

    resolved.intersect(scope)
}

/// Resolve `identity`, optionally narrow to `company_filter`, and project rules of `kind`.
///
/// With a company filter the identity's conditions and the company's conditions are
/// resolved concurrently; both must succeed.
///
/// # Errors
///
/// Returns the resolver's errors; an unknown filter company is
/// [`ConditionsError::CompanyNotFound`].
pub async fn project_rules<S>(
    resolver: AssociationResolver<'_, S>,
    identity: Identity,
    kind: RuleKind,
    company_filter: Option<CompanyUuid>,
    now: Timestamp,
    cancel: &CancellationToken,
) -> Result<Vec<RuleView>, ConditionsError>
where
    S: EntityStore + ?Sized,
{
    let resolved = match company_filter {
        None => resolver.resolve_conditions(identity, cancel).await?,
        Some(company) => {
            let (resolved, scope) = tokio::try_join!(
                resolver.resolve_conditions(identity, cancel),
                resolver.resolve_conditions(Identity::Company(company), cancel),
            )?;

            narrow_to_company(resolved, company, &scope)
        }
    };

    Ok(RuleProjector::new(now).project(&resolved.conditions, kind))
}

/// Build the view of an active rule, or `None` when it is inactive or malformed.
fn view(condition: &ConditionRecord, rule: &RuleRecord) -> Option<RuleView> {
    if !rule.active || rule.condition_uuid != condition.uuid {
        return None;
    }

    let discount = match validate(rule) {
        Ok(discount) => discount,
        Err(violation) => {
            warn!(
                rule_uuid = %rule.uuid,
                condition_uuid = %condition.uuid,
                error = %violation,
                "skipping malformed rule"
            );

            return None;
        }
    };

    Some(RuleView {
        rule_uuid: rule.uuid,
        condition_uuid: condition.uuid,
        condition_name: condition.name.clone(),
        condition_priority: condition.priority,
        kind: rule.kind,
        expression: rule.expression.clone(),
        priority: rule.priority,
        discount,
    })
}

fn validate(rule: &RuleRecord) -> Result<Option<RuleDiscount>, IntegrityViolation> {
    check_expression(&rule.expression)?;

    match rule.kind {
        RuleKind::Discount => {
            RuleDiscount::from_parts(rule.discount_type, rule.discount_value).map(Some)
        }
        RuleKind::Visibility => {
            if rule.discount_type.is_some() || rule.discount_value.is_some() {
                warn!(rule_uuid = %rule.uuid, "ignoring discount fields on visibility rule");
            }

            Ok(None)
        }
    }
}
