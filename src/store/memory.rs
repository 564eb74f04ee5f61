//! In-memory entity store.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::{
    records::{
        AssignmentRecord, CompanyRecord, CompanyUuid, ConditionRecord, ConditionUuid,
        ConditionWithRules, MembershipRecord, RuleRecord, UserRecord, UserUuid,
    },
    store::{EntityStore, StoreError},
};

/// Entity store backed by hash maps.
///
/// Memberships and assignments are keyed by their pair, so inserting a second record
/// for the same pair replaces the first. Listing operations return records in creation
/// order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    users: FxHashMap<UserUuid, UserRecord>,
    companies: FxHashMap<CompanyUuid, CompanyRecord>,
    memberships: FxHashMap<(UserUuid, CompanyUuid), MembershipRecord>,
    assignments: FxHashMap<(CompanyUuid, ConditionUuid), AssignmentRecord>,
    conditions: FxHashMap<ConditionUuid, ConditionRecord>,
    rules: FxHashMap<ConditionUuid, Vec<RuleRecord>>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn insert_user(&mut self, user: UserRecord) {
        self.users.insert(user.uuid, user);
    }

    /// Insert or replace a company.
    pub fn insert_company(&mut self, company: CompanyRecord) {
        self.companies.insert(company.uuid, company);
    }

    /// Insert or replace the membership for its `(user, company)` pair.
    pub fn insert_membership(&mut self, membership: MembershipRecord) {
        self.memberships
            .insert((membership.user_uuid, membership.company_uuid), membership);
    }

    /// Insert or replace the assignment for its `(company, condition)` pair.
    pub fn insert_assignment(&mut self, assignment: AssignmentRecord) {
        self.assignments.insert(
            (assignment.company_uuid, assignment.condition_uuid),
            assignment,
        );
    }

    /// Insert or replace a condition. Its rules are kept.
    pub fn insert_condition(&mut self, condition: ConditionRecord) {
        self.rules.entry(condition.uuid).or_default();
        self.conditions.insert(condition.uuid, condition);
    }

    /// Insert or replace a rule under its owning condition.
    pub fn insert_rule(&mut self, rule: RuleRecord) {
        let rules = self.rules.entry(rule.condition_uuid).or_default();

        match rules.iter_mut().find(|existing| existing.uuid == rule.uuid) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    /// Mutable access to a membership, for toggling its activation flag.
    pub fn membership_mut(
        &mut self,
        user: UserUuid,
        company: CompanyUuid,
    ) -> Option<&mut MembershipRecord> {
        self.memberships.get_mut(&(user, company))
    }

    /// Mutable access to an assignment, for toggling its activation flag.
    pub fn assignment_mut(
        &mut self,
        company: CompanyUuid,
        condition: ConditionUuid,
    ) -> Option<&mut AssignmentRecord> {
        self.assignments.get_mut(&(company, condition))
    }

    /// Mutable access to a condition.
    pub fn condition_mut(&mut self, uuid: ConditionUuid) -> Option<&mut ConditionRecord> {
        self.conditions.get_mut(&uuid)
    }

    /// Mutable access to a user.
    pub fn user_mut(&mut self, uuid: UserUuid) -> Option<&mut UserRecord> {
        self.users.get_mut(&uuid)
    }

    /// Mutable access to a company.
    pub fn company_mut(&mut self, uuid: CompanyUuid) -> Option<&mut CompanyRecord> {
        self.companies.get_mut(&uuid)
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get_user(&self, uuid: UserUuid) -> Result<UserRecord, StoreError> {
        self.users.get(&uuid).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_company(&self, uuid: CompanyUuid) -> Result<CompanyRecord, StoreError> {
        self.companies
            .get(&uuid)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_active_memberships_for_user(
        &self,
        user: UserUuid,
    ) -> Result<Vec<MembershipRecord>, StoreError> {
        let mut memberships: Vec<MembershipRecord> = self
            .memberships
            .values()
            .filter(|membership| membership.user_uuid == user && membership.active)
            .cloned()
            .collect();

        memberships.sort_by_key(|membership| (membership.created_at, membership.company_uuid));

        Ok(memberships)
    }

    async fn get_active_assignments_for_company(
        &self,
        company: CompanyUuid,
    ) -> Result<Vec<AssignmentRecord>, StoreError> {
        let mut assignments: Vec<AssignmentRecord> = self
            .assignments
            .values()
            .filter(|assignment| assignment.company_uuid == company && assignment.active)
            .cloned()
            .collect();

        assignments.sort_by_key(|assignment| (assignment.created_at, assignment.condition_uuid));

        Ok(assignments)
    }

    async fn get_condition_with_rules(
        &self,
        uuid: ConditionUuid,
    ) -> Result<ConditionWithRules, StoreError> {
        let condition = self
            .conditions
            .get(&uuid)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let rules = self.rules.get(&uuid).cloned().unwrap_or_default();

        Ok(ConditionWithRules { condition, rules })
    }
}
