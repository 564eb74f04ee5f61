//! Fixtures
//!
//! Builds an [`InMemoryEntityStore`] from short names, so tests can describe an
//! association graph as `user -> company -> condition -> rule` without handling uuids.

use jiff::{SignedDuration, Timestamp};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smallvec::smallvec;
use thiserror::Error;

use crate::{
    discounts::DiscountType,
    records::{
        AssignmentRecord, CompanyRecord, CompanyUuid, ConditionRecord, ConditionUuid,
        MembershipRecord, RuleKind, RuleRecord, RuleUuid, UserRecord, UserUuid,
    },
    store::InMemoryEntityStore,
};

/// Fixed evaluation instant used by fixtures: 2026-01-01T00:00:00Z.
pub const FIXTURE_NOW: Timestamp = Timestamp::constant(1_767_225_600, 0);

/// Fixture Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Name already used for another record of the same type
    #[error("Duplicate fixture name: {0}")]
    Duplicate(String),

    /// User not found
    #[error("User not found: {0}")]
    UnknownUser(String),

    /// Company not found
    #[error("Company not found: {0}")]
    UnknownCompany(String),

    /// Condition not found
    #[error("Condition not found: {0}")]
    UnknownCondition(String),

    /// Rule not found
    #[error("Rule not found: {0}")]
    UnknownRule(String),

    /// Timestamp arithmetic overflowed
    #[error("Invalid fixture timestamp: {0}")]
    Time(#[from] jiff::Error),
}

/// Discount columns of a raw rule, possibly malformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDiscount {
    /// Discount type column
    pub kind: Option<DiscountType>,

    /// Discount value column
    pub value: Option<Decimal>,
}

/// Fixture
#[derive(Debug)]
pub struct Fixture {
    now: Timestamp,
    sequence: i64,
    store: InMemoryEntityStore,

    /// Name -> uuid mappings for lookups
    users: FxHashMap<String, UserUuid>,
    companies: FxHashMap<String, CompanyUuid>,
    conditions: FxHashMap<String, ConditionUuid>,
    rules: FxHashMap<String, RuleUuid>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Create an empty fixture evaluated at [`FIXTURE_NOW`].
    pub fn new() -> Self {
        Self::at(FIXTURE_NOW)
    }

    /// Create an empty fixture evaluated at `now`.
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            sequence: 0,
            store: InMemoryEntityStore::new(),
            users: FxHashMap::default(),
            companies: FxHashMap::default(),
            conditions: FxHashMap::default(),
            rules: FxHashMap::default(),
        }
    }

    /// The evaluation instant of this fixture.
    pub const fn now(&self) -> Timestamp {
        self.now
    }

    /// `now` shifted back by whole days.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is out of range.
    pub fn days_ago(&self, days: i64) -> Result<Timestamp, FixtureError> {
        Ok(self.now.checked_sub(SignedDuration::from_hours(24 * days))?)
    }

    /// `now` shifted forward by whole days.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is out of range.
    pub fn days_from_now(&self, days: i64) -> Result<Timestamp, FixtureError> {
        Ok(self.now.checked_add(SignedDuration::from_hours(24 * days))?)
    }

    /// Add an active customer user.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    pub fn user(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let uuid = UserUuid::new();
        let created_at = self.next_created_at()?;

        insert_name(&mut self.users, name, uuid)?;

        self.store.insert_user(UserRecord {
            uuid,
            name: name.to_string(),
            user_type: "customer".to_string(),
            roles: smallvec!["buyer".to_string()],
            active: true,
            created_at,
            updated_at: created_at,
        });

        Ok(self)
    }

    /// Add an active company.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    pub fn company(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let uuid = CompanyUuid::new();
        let created_at = self.next_created_at()?;

        insert_name(&mut self.companies, name, uuid)?;

        self.store.insert_company(CompanyRecord {
            uuid,
            legal_name: format!("{name} Ltd"),
            trade_name: name.to_string(),
            tax_id: format!("TAX-{}", self.companies.len()),
            active: true,
            created_at,
            updated_at: created_at,
        });

        Ok(self)
    }

    /// Add an active membership. Later memberships are more recent.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is unknown.
    pub fn membership(&mut self, user: &str, company: &str) -> Result<&mut Self, FixtureError> {
        let user_uuid = self.user_uuid(user)?;
        let company_uuid = self.company_uuid(company)?;
        let created_at = self.next_created_at()?;

        self.store.insert_membership(MembershipRecord {
            user_uuid,
            company_uuid,
            active: true,
            created_at,
        });

        Ok(self)
    }

    /// Add an active condition with an unbounded validity window.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    pub fn condition(&mut self, name: &str, priority: i32) -> Result<&mut Self, FixtureError> {
        self.condition_window(name, priority, None, None)
    }

    /// Add an active condition with the given validity window.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    pub fn condition_window(
        &mut self,
        name: &str,
        priority: i32,
        valid_from: Option<Timestamp>,
        valid_until: Option<Timestamp>,
    ) -> Result<&mut Self, FixtureError> {
        let uuid = ConditionUuid::new();
        let created_at = self.next_created_at()?;

        insert_name(&mut self.conditions, name, uuid)?;

        self.store.insert_condition(ConditionRecord {
            uuid,
            name: name.to_string(),
            priority,
            valid_from,
            valid_until,
            active: true,
            created_at,
            updated_at: created_at,
        });

        Ok(self)
    }

    /// Add an active assignment of a condition to a company.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is unknown.
    pub fn assign(&mut self, company: &str, condition: &str) -> Result<&mut Self, FixtureError> {
        let company_uuid = self.company_uuid(company)?;
        let condition_uuid = self.condition_uuid(condition)?;
        let created_at = self.next_created_at()?;

        self.store.insert_assignment(AssignmentRecord {
            company_uuid,
            condition_uuid,
            active: true,
            created_at,
        });

        Ok(self)
    }

    /// Add an active visibility rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition is unknown or the rule name is taken.
    pub fn visibility_rule(
        &mut self,
        condition: &str,
        name: &str,
        priority: i32,
    ) -> Result<&mut Self, FixtureError> {
        self.raw_rule(
            condition,
            name,
            RuleKind::Visibility,
            priority,
            RawDiscount::default(),
        )
    }

    /// Add an active, well-formed discount rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition is unknown or the rule name is taken.
    pub fn discount_rule(
        &mut self,
        condition: &str,
        name: &str,
        priority: i32,
        kind: DiscountType,
        value: Decimal,
    ) -> Result<&mut Self, FixtureError> {
        self.raw_rule(
            condition,
            name,
            RuleKind::Discount,
            priority,
            RawDiscount {
                kind: Some(kind),
                value: Some(value),
            },
        )
    }

    /// Add an active rule with raw discount columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition is unknown or the rule name is taken.
    pub fn raw_rule(
        &mut self,
        condition: &str,
        name: &str,
        kind: RuleKind,
        priority: i32,
        discount: RawDiscount,
    ) -> Result<&mut Self, FixtureError> {
        let condition_uuid = self.condition_uuid(condition)?;
        let uuid = RuleUuid::new();
        let created_at = self.next_created_at()?;

        insert_name(&mut self.rules, name, uuid)?;

        self.store.insert_rule(RuleRecord {
            uuid,
            condition_uuid,
            kind,
            expression: format!("product.tags contains \"{name}\""),
            priority,
            discount_type: discount.kind,
            discount_value: discount.value,
            active: true,
            created_at,
            updated_at: created_at,
        });

        Ok(self)
    }

    /// Look up a user uuid by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown.
    pub fn user_uuid(&self, name: &str) -> Result<UserUuid, FixtureError> {
        self.users
            .get(name)
            .copied()
            .ok_or_else(|| FixtureError::UnknownUser(name.to_string()))
    }

    /// Look up a company uuid by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown.
    pub fn company_uuid(&self, name: &str) -> Result<CompanyUuid, FixtureError> {
        self.companies
            .get(name)
            .copied()
            .ok_or_else(|| FixtureError::UnknownCompany(name.to_string()))
    }

    /// Look up a condition uuid by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown.
    pub fn condition_uuid(&self, name: &str) -> Result<ConditionUuid, FixtureError> {
        self.conditions
            .get(name)
            .copied()
            .ok_or_else(|| FixtureError::UnknownCondition(name.to_string()))
    }

    /// Look up a rule uuid by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown.
    pub fn rule_uuid(&self, name: &str) -> Result<RuleUuid, FixtureError> {
        self.rules
            .get(name)
            .copied()
            .ok_or_else(|| FixtureError::UnknownRule(name.to_string()))
    }

    /// Reverse lookup of a rule name, for readable assertions.
    pub fn rule_name(&self, uuid: RuleUuid) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, candidate)| **candidate == uuid)
            .map(|(name, _)| name.as_str())
    }

    /// Map projected rule uuids back to their fixture names.
    pub fn rule_names<I>(&self, uuids: I) -> Vec<String>
    where
        I: IntoIterator<Item = RuleUuid>,
    {
        uuids
            .into_iter()
            .map(|uuid| {
                self.rule_name(uuid)
                    .map_or_else(|| uuid.to_string(), str::to_string)
            })
            .collect()
    }

    /// The store built so far.
    pub const fn store(&self) -> &InMemoryEntityStore {
        &self.store
    }

    /// Mutable access to the store, for flipping activation flags.
    pub const fn store_mut(&mut self) -> &mut InMemoryEntityStore {
        &mut self.store
    }

    /// Consume the fixture, keeping only the store.
    pub fn into_store(self) -> InMemoryEntityStore {
        self.store
    }

    fn next_created_at(&mut self) -> Result<Timestamp, FixtureError> {
        self.sequence += 1;

        Ok(self
            .now
            .checked_sub(SignedDuration::from_hours(24 * 30))?
            .checked_add(SignedDuration::from_secs(self.sequence))?)
    }
}

fn insert_name<K: Copy>(
    names: &mut FxHashMap<String, K>,
    name: &str,
    uuid: K,
) -> Result<(), FixtureError> {
    if names.contains_key(name) {
        return Err(FixtureError::Duplicate(name.to_string()));
    }

    names.insert(name.to_string(), uuid);

    Ok(())
}
