//! Association Resolver
//!
//! Walks `user -> membership -> company -> assignment -> condition`. Each hop keeps its
//! own named intermediate set and its own activation predicate, so a deactivated
//! membership or assignment prunes exactly the branch behind it. Time validity is not
//! applied here; see [`crate::validity`].
//!
//! Lookups that do not depend on each other (assignments of several companies,
//! conditions of several assignments) are issued concurrently and joined before the
//! result is returned. The first failing lookup fails the whole resolution.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
};

use futures::future::try_join_all;
use rustc_hash::FxHashSet;
use smallvec::{SmallVec, smallvec};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug};

use crate::{
    errors::ConditionsError,
    records::{
        AssignmentRecord, CompanyRecord, CompanyUuid, ConditionUuid, ConditionWithRules,
        MembershipRecord, UserRecord, UserUuid,
    },
    store::EntityStore,
};

/// Companies reached during a resolution. Users rarely belong to more than a handful.
pub type ReachedCompanies = SmallVec<[CompanyUuid; 4]>;

/// Starting point of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Resolve through every active membership of a user.
    User(UserUuid),

    /// Resolve through a single company.
    Company(CompanyUuid),
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::User(uuid) => write!(f, "user:{uuid}"),
            Self::Company(uuid) => write!(f, "company:{uuid}"),
        }
    }
}

/// Conditions reachable from an identity through active links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConditions {
    /// Companies reached through active memberships, or the company identity itself.
    pub companies: ReachedCompanies,

    /// Reachable conditions, deduplicated, in the order they were first reached.
    pub conditions: Vec<ConditionWithRules>,
}

impl ResolvedConditions {
    /// Whether no condition is reachable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `uuid` is among the reachable conditions.
    #[must_use]
    pub fn contains(&self, uuid: ConditionUuid) -> bool {
        self.conditions
            .iter()
            .any(|entry| entry.condition.uuid == uuid)
    }

    /// Keep only conditions also present in `other`.
    #[must_use]
    pub fn intersect(self, other: &Self) -> Self {
        let conditions = self
            .conditions
            .into_iter()
            .filter(|entry| other.contains(entry.condition.uuid))
            .collect();

        Self {
            companies: self
                .companies
                .into_iter()
                .filter(|company| other.companies.contains(company))
                .collect(),
            conditions,
        }
    }
}

/// A membership links its user to its company only while active.
fn membership_links(membership: &MembershipRecord) -> bool {
    membership.active
}

/// An assignment links its company to its condition only while active.
fn assignment_links(assignment: &AssignmentRecord) -> bool {
    assignment.active
}

/// Race `future` against cancellation, preferring cancellation when both are ready.
///
/// # Errors
///
/// Returns [`ConditionsError::Cancelled`] once `cancel` fires, otherwise the output
/// of `future`.
pub async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, ConditionsError>
where
    F: Future<Output = Result<T, ConditionsError>>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(ConditionsError::Cancelled),
        result = future => result,
    }
}

/// Resolves identities to reachable conditions against an [`EntityStore`].
#[derive(Debug)]
pub struct AssociationResolver<'s, S: ?Sized> {
    store: &'s S,
}

impl<S: ?Sized> Clone for AssociationResolver<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for AssociationResolver<'_, S> {}

impl<'s, S> AssociationResolver<'s, S>
where
    S: EntityStore + ?Sized,
{
    /// Create a resolver reading from `store`.
    pub const fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Resolve the conditions reachable from `identity`.
    ///
    /// A user with no active memberships, or a company with no active assignments,
    /// resolves to an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionsError::UserNotFound`] or [`ConditionsError::CompanyNotFound`]
    /// for unknown identities, [`ConditionsError::ConditionNotFound`] when an assignment
    /// points at a missing condition, [`ConditionsError::Unavailable`] when the store
    /// fails, and [`ConditionsError::Cancelled`] when `cancel` fires first.
    #[tracing::instrument(
        name = "conditions.resolver.resolve_conditions",
        skip(self, identity, cancel),
        fields(
            identity = %identity,
            company_count = tracing::field::Empty,
            condition_count = tracing::field::Empty
        ),
        err
    )]
    pub async fn resolve_conditions(
        &self,
        identity: Identity,
        cancel: &CancellationToken,
    ) -> Result<ResolvedConditions, ConditionsError> {
        let companies: ReachedCompanies = match identity {
            Identity::User(user) => self
                .active_memberships(user, cancel)
                .await?
                .into_iter()
                .map(|membership| membership.company_uuid)
                .collect(),
            Identity::Company(company) => {
                self.fetch_company(company, cancel).await?;

                smallvec![company]
            }
        };

        let conditions = self.resolve_for_companies(&companies, cancel).await?;

        let span = Span::current();

        span.record("company_count", companies.len());
        span.record("condition_count", conditions.len());

        Ok(ResolvedConditions {
            companies,
            conditions,
        })
    }

    /// Active memberships of an existing user, one per company.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionsError::UserNotFound`] for unknown users, otherwise store
    /// and cancellation errors.
    pub async fn active_memberships(
        &self,
        user: UserUuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<MembershipRecord>, ConditionsError> {
        self.fetch_user(user, cancel).await?;

        self.memberships(user, cancel).await
    }

    /// Active memberships of `user`, without checking that the user exists.
    pub(crate) async fn memberships(
        &self,
        user: UserUuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<MembershipRecord>, ConditionsError> {
        let memberships = cancellable(cancel, async {
            self.store
                .get_active_memberships_for_user(user)
                .await
                .map_err(|error| {
                    ConditionsError::from_store(error, ConditionsError::UserNotFound(user))
                })
        })
        .await?;

        let mut seen = FxHashSet::default();

        let memberships: Vec<MembershipRecord> = memberships
            .into_iter()
            .filter(membership_links)
            .filter(|membership| membership.user_uuid == user)
            .filter(|membership| seen.insert(membership.company_uuid))
            .collect();

        debug!(%user, membership_count = memberships.len(), "resolved memberships");

        Ok(memberships)
    }

    /// Conditions reachable through active assignments of `companies`.
    ///
    /// Companies are not checked for existence; an unknown company has no assignments.
    ///
    /// # Errors
    ///
    /// Returns store and cancellation errors, and
    /// [`ConditionsError::ConditionNotFound`] for dangling assignments.
    pub async fn resolve_for_companies(
        &self,
        companies: &[CompanyUuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<ConditionWithRules>, ConditionsError> {
        if companies.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = cancellable(
            cancel,
            try_join_all(
                companies
                    .iter()
                    .map(|&company| self.active_assignments(company)),
            ),
        )
        .await?;

        let mut seen = FxHashSet::default();

        let condition_uuids: Vec<ConditionUuid> = assignments
            .into_iter()
            .flatten()
            .map(|assignment| assignment.condition_uuid)
            .filter(|uuid| seen.insert(*uuid))
            .collect();

        debug!(
            company_count = companies.len(),
            condition_count = condition_uuids.len(),
            "resolved assignments"
        );

        if condition_uuids.is_empty() {
            return Ok(Vec::new());
        }

        cancellable(
            cancel,
            try_join_all(
                condition_uuids
                    .into_iter()
                    .map(|uuid| self.condition_with_rules(uuid)),
            ),
        )
        .await
    }

    pub(crate) async fn fetch_user(
        &self,
        user: UserUuid,
        cancel: &CancellationToken,
    ) -> Result<UserRecord, ConditionsError> {
        cancellable(cancel, async {
            self.store.get_user(user).await.map_err(|error| {
                ConditionsError::from_store(error, ConditionsError::UserNotFound(user))
            })
        })
        .await
    }

    pub(crate) async fn fetch_company(
        &self,
        company: CompanyUuid,
        cancel: &CancellationToken,
    ) -> Result<CompanyRecord, ConditionsError> {
        cancellable(cancel, async {
            self.store
                .get_company(company)
                .await
                .map_err(|error| {
                    ConditionsError::from_store(error, ConditionsError::CompanyNotFound(company))
                })
        })
        .await
    }

    async fn active_assignments(
        &self,
        company: CompanyUuid,
    ) -> Result<Vec<AssignmentRecord>, ConditionsError> {
        let assignments = self
            .store
            .get_active_assignments_for_company(company)
            .await
            .map_err(|error| {
                ConditionsError::from_store(error, ConditionsError::CompanyNotFound(company))
            })?;

        Ok(assignments
            .into_iter()
            .filter(assignment_links)
            .filter(|assignment| assignment.company_uuid == company)
            .collect())
    }

    async fn condition_with_rules(
        &self,
        uuid: ConditionUuid,
    ) -> Result<ConditionWithRules, ConditionsError> {
        self.store
            .get_condition_with_rules(uuid)
            .await
            .map_err(|error| {
                ConditionsError::from_store(error, ConditionsError::ConditionNotFound(uuid))
            })
    }
}
