//! Access Check
//!
//! Reports whether a user currently has anything to resolve. This is state for a
//! gateway to act on, not an authorization decision.

use futures::future::try_join_all;
use jiff::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    context::primary_membership,
    errors::ConditionsError,
    records::{CompanyUuid, UserUuid},
    resolver::{AssociationResolver, cancellable},
    store::EntityStore,
    validity::is_effective,
};

/// Aggregate access state of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessResult {
    /// User identifier
    pub user_uuid: UserUuid,

    /// The user's own activation flag
    pub user_active: bool,

    /// At least one active membership exists
    pub has_active_membership: bool,

    /// At least one company reached through an active membership is active
    pub company_active: bool,

    /// At least one effective condition is reachable through an active company
    pub has_effective_conditions: bool,

    /// Company of the most recent active membership, if any
    pub primary_company: Option<CompanyUuid>,

    /// Conjunction of the four facts above
    pub granted: bool,
}

/// Compute the access state of `user` at `now`.
///
/// # Errors
///
/// Returns [`ConditionsError::UserNotFound`] for unknown users,
/// [`ConditionsError::CompanyNotFound`] when a membership points at a missing company,
/// and store or cancellation errors.
pub async fn check_access<S>(
    store: &S,
    user: UserUuid,
    now: Timestamp,
    cancel: &CancellationToken,
) -> Result<AccessResult, ConditionsError>
where
    S: EntityStore + ?Sized,
{
    let resolver = AssociationResolver::new(store);

    let (record, memberships) = tokio::try_join!(
        resolver.fetch_user(user, cancel),
        resolver.memberships(user, cancel),
    )?;

    let companies = cancellable(
        cancel,
        try_join_all(
            memberships
                .iter()
                .map(|membership| resolver.fetch_company(membership.company_uuid, cancel)),
        ),
    )
    .await?;

    let active_companies: Vec<CompanyUuid> = companies
        .iter()
        .filter(|company| company.active)
        .map(|company| company.uuid)
        .collect();

    let conditions = resolver
        .resolve_for_companies(&active_companies, cancel)
        .await?;

    let has_active_membership = !memberships.is_empty();
    let company_active = !active_companies.is_empty();
    let has_effective_conditions = conditions
        .iter()
        .any(|entry| is_effective(&entry.condition, now));

    Ok(AccessResult {
        user_uuid: record.uuid,
        user_active: record.active,
        has_active_membership,
        company_active,
        has_effective_conditions,
        primary_company: primary_membership(&memberships).map(|membership| membership.company_uuid),
        granted: record.active && has_active_membership && company_active && has_effective_conditions,
    })
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures::Fixture;

    use super::*;

    fn granted_fixture() -> TestResult<Fixture> {
        let mut fixture = Fixture::new();

        fixture
            .user("alice")?
            .company("acme")?
            .membership("alice", "acme")?
            .condition("spring", 10)?
            .assign("acme", "spring")?;

        Ok(fixture)
    }

    #[tokio::test]
    async fn fully_linked_user_is_granted() -> TestResult {
        let fixture = granted_fixture()?;
        let user = fixture.user_uuid("alice")?;

        let access = check_access(
            fixture.store(),
            user,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

        assert_eq!(
            access,
            AccessResult {
                user_uuid: user,
                user_active: true,
                has_active_membership: true,
                company_active: true,
                has_effective_conditions: true,
                primary_company: Some(fixture.company_uuid("acme")?),
                granted: true,
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn inactive_user_is_not_granted() -> TestResult {
        let mut fixture = granted_fixture()?;
        let user = fixture.user_uuid("alice")?;

        if let Some(record) = fixture.store_mut().user_mut(user) {
            record.active = false;
        }

        let access = check_access(
            fixture.store(),
            user,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

        assert!(!access.user_active);
        assert!(access.has_effective_conditions);
        assert!(!access.granted);

        Ok(())
    }

    #[tokio::test]
    async fn inactive_company_hides_its_conditions() -> TestResult {
        let mut fixture = granted_fixture()?;
        let user = fixture.user_uuid("alice")?;
        let company = fixture.company_uuid("acme")?;

        if let Some(record) = fixture.store_mut().company_mut(company) {
            record.active = false;
        }

        let access = check_access(
            fixture.store(),
            user,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

        assert!(access.has_active_membership);
        assert!(!access.company_active);
        assert!(!access.has_effective_conditions);
        assert!(!access.granted);

        Ok(())
    }

    #[tokio::test]
    async fn expired_conditions_are_not_effective() -> TestResult {
        let mut fixture = granted_fixture()?;
        let user = fixture.user_uuid("alice")?;
        let condition = fixture.condition_uuid("spring")?;
        let yesterday = fixture.days_ago(1)?;

        if let Some(record) = fixture.store_mut().condition_mut(condition) {
            record.valid_until = Some(yesterday);
        }

        let access = check_access(
            fixture.store(),
            user,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

        assert!(access.company_active);
        assert!(!access.has_effective_conditions);
        assert!(!access.granted);

        Ok(())
    }

    #[tokio::test]
    async fn user_without_memberships_is_not_granted() -> TestResult {
        let mut fixture = Fixture::new();

        fixture.user("alice")?;

        let user = fixture.user_uuid("alice")?;

        let access = check_access(
            fixture.store(),
            user,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

        assert!(!access.has_active_membership);
        assert!(!access.company_active);
        assert!(!access.has_effective_conditions);
        assert!(access.primary_company.is_none());
        assert!(!access.granted);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let fixture = Fixture::new();
        let user = UserUuid::new();

        let result = check_access(
            fixture.store(),
            user,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await;

        assert!(
            matches!(result, Err(ConditionsError::UserNotFound(uuid)) if uuid == user),
            "expected UserNotFound, got {result:?}"
        );
    }
}
