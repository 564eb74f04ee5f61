//! Conditions service.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use tokio_util::sync::CancellationToken;
use tracing::{Span, info};

use crate::{
    access::{AccessResult, check_access},
    context::{UserContext, build_user_context},
    errors::ConditionsError,
    projector::{ConditionView, RuleProjector, RuleView, project_rules},
    records::{CompanyUuid, RuleKind, UserUuid},
    resolver::{AssociationResolver, Identity},
    store::EntityStore,
};

/// [`ConditionsService`] backed by an [`EntityStore`].
#[derive(Debug)]
pub struct StoreConditionsService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for StoreConditionsService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> StoreConditionsService<S>
where
    S: EntityStore + ?Sized,
{
    /// Create a service reading from `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn resolver(&self) -> AssociationResolver<'_, S> {
        AssociationResolver::new(self.store.as_ref())
    }

    async fn rules(
        &self,
        user: UserUuid,
        kind: RuleKind,
        company: Option<CompanyUuid>,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleView>, ConditionsError> {
        let rules = project_rules(
            self.resolver(),
            Identity::User(user),
            kind,
            company,
            point_in_time,
            cancel,
        )
        .await?;

        Span::current().record("rule_count", rules.len());

        info!(%user, %kind, rule_count = rules.len(), "resolved rules");

        Ok(rules)
    }
}

#[async_trait]
impl<S> ConditionsService for StoreConditionsService<S>
where
    S: EntityStore + ?Sized + 'static,
{
    #[tracing::instrument(
        name = "conditions.service.resolve_user_conditions",
        skip(self, user, cancel),
        fields(user = %user, condition_count = tracing::field::Empty),
        err
    )]
    async fn resolve_user_conditions(
        &self,
        user: UserUuid,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConditionView>, ConditionsError> {
        let resolved = self
            .resolver()
            .resolve_conditions(Identity::User(user), cancel)
            .await?;

        let conditions = RuleProjector::new(point_in_time).project_conditions(&resolved.conditions);

        Span::current().record("condition_count", conditions.len());

        Ok(conditions)
    }

    #[tracing::instrument(
        name = "conditions.service.resolve_company_conditions",
        skip(self, company, cancel),
        fields(company = %company, condition_count = tracing::field::Empty),
        err
    )]
    async fn resolve_company_conditions(
        &self,
        company: CompanyUuid,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConditionView>, ConditionsError> {
        let resolved = self
            .resolver()
            .resolve_conditions(Identity::Company(company), cancel)
            .await?;

        let conditions = RuleProjector::new(point_in_time).project_conditions(&resolved.conditions);

        Span::current().record("condition_count", conditions.len());

        Ok(conditions)
    }

    #[tracing::instrument(
        name = "conditions.service.resolve_visibility_rules",
        skip(self, user, company, cancel),
        fields(
            user = %user,
            company = ?company,
            rule_count = tracing::field::Empty
        ),
        err
    )]
    async fn resolve_visibility_rules(
        &self,
        user: UserUuid,
        company: Option<CompanyUuid>,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleView>, ConditionsError> {
        self.rules(user, RuleKind::Visibility, company, point_in_time, cancel)
            .await
    }

    #[tracing::instrument(
        name = "conditions.service.resolve_discount_rules",
        skip(self, user, company, cancel),
        fields(
            user = %user,
            company = ?company,
            rule_count = tracing::field::Empty
        ),
        err
    )]
    async fn resolve_discount_rules(
        &self,
        user: UserUuid,
        company: Option<CompanyUuid>,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleView>, ConditionsError> {
        self.rules(user, RuleKind::Discount, company, point_in_time, cancel)
            .await
    }

    #[tracing::instrument(
        name = "conditions.service.build_user_context",
        skip(self, user, cancel),
        fields(user = %user),
        err
    )]
    async fn build_user_context(
        &self,
        user: UserUuid,
        cancel: &CancellationToken,
    ) -> Result<UserContext, ConditionsError> {
        build_user_context(self.store.as_ref(), user, cancel).await
    }

    #[tracing::instrument(
        name = "conditions.service.check_access",
        skip(self, user, cancel),
        fields(user = %user, granted = tracing::field::Empty),
        err
    )]
    async fn check_access(
        &self,
        user: UserUuid,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<AccessResult, ConditionsError> {
        let access = check_access(self.store.as_ref(), user, point_in_time, cancel).await?;

        Span::current().record("granted", access.granted);

        Ok(access)
    }
}

/// Resolution operations exposed to callers.
#[automock]
#[async_trait]
pub trait ConditionsService: Send + Sync {
    /// Effective conditions reachable by a user, each with its effective rules.
    async fn resolve_user_conditions(
        &self,
        user: UserUuid,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConditionView>, ConditionsError>;

    /// Effective conditions assigned to a company, each with its effective rules.
    async fn resolve_company_conditions(
        &self,
        company: CompanyUuid,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConditionView>, ConditionsError>;

    /// Ordered visibility rules of a user, optionally narrowed to one company.
    async fn resolve_visibility_rules(
        &self,
        user: UserUuid,
        company: Option<CompanyUuid>,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleView>, ConditionsError>;

    /// Ordered discount rules of a user, optionally narrowed to one company.
    async fn resolve_discount_rules(
        &self,
        user: UserUuid,
        company: Option<CompanyUuid>,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleView>, ConditionsError>;

    /// Variables available to expression evaluators for a user.
    async fn build_user_context(
        &self,
        user: UserUuid,
        cancel: &CancellationToken,
    ) -> Result<UserContext, ConditionsError>;

    /// Aggregate access state of a user.
    async fn check_access(
        &self,
        user: UserUuid,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<AccessResult, ConditionsError>;
}
