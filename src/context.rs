//! Context Assembler
//!
//! Builds the read-only variables external expression evaluators may reference. Nothing
//! here looks at expressions.

use serde::Serialize;
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::ConditionsError,
    records::{CompanyRecord, CompanyUuid, MembershipRecord, UserUuid},
    resolver::AssociationResolver,
    store::EntityStore,
};

/// Attributes of a user's primary company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanySummary {
    /// Company identifier
    pub uuid: CompanyUuid,

    /// Tax identifier
    pub tax_id: String,

    /// Trade name
    pub trade_name: String,

    /// Activation flag
    pub active: bool,
}

impl From<CompanyRecord> for CompanySummary {
    fn from(company: CompanyRecord) -> Self {
        Self {
            uuid: company.uuid,
            tax_id: company.tax_id,
            trade_name: company.trade_name,
            active: company.active,
        }
    }
}

/// Attributes of a user, for expression evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    /// User identifier
    pub uuid: UserUuid,

    /// User type tag
    pub user_type: String,

    /// Role tags
    pub roles: SmallVec<[String; 4]>,

    /// Activation flag
    pub active: bool,

    /// Company of the most recent active membership, if any
    pub primary_company: Option<CompanySummary>,
}

/// The most recent active membership; ties go to the lowest company uuid.
pub fn primary_membership(memberships: &[MembershipRecord]) -> Option<&MembershipRecord> {
    memberships
        .iter()
        .filter(|membership| membership.active)
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| b.company_uuid.cmp(&a.company_uuid))
        })
}

/// Assemble the context of `user`.
///
/// # Errors
///
/// Returns [`ConditionsError::UserNotFound`] for unknown users,
/// [`ConditionsError::CompanyNotFound`] when the primary membership points at a missing
/// company, and store or cancellation errors.
pub async fn build_user_context<S>(
    store: &S,
    user: UserUuid,
    cancel: &CancellationToken,
) -> Result<UserContext, ConditionsError>
where
    S: EntityStore + ?Sized,
{
    let resolver = AssociationResolver::new(store);

    let (record, memberships) = tokio::try_join!(
        resolver.fetch_user(user, cancel),
        resolver.memberships(user, cancel),
    )?;

    let primary_company = match primary_membership(&memberships) {
        Some(membership) => Some(CompanySummary::from(
            resolver
                .fetch_company(membership.company_uuid, cancel)
                .await?,
        )),
        None => None,
    };

    Ok(UserContext {
        uuid: record.uuid,
        user_type: record.user_type,
        roles: record.roles,
        active: record.active,
        primary_company,
    })
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures::Fixture;

    use super::*;

    #[tokio::test]
    async fn context_carries_user_tags_and_primary_company() -> TestResult {
        let mut fixture = Fixture::new();

        fixture
            .user("alice")?
            .company("acme")?
            .company("globex")?
            .membership("alice", "acme")?
            .membership("alice", "globex")?;

        let user = fixture.user_uuid("alice")?;
        let globex = fixture.company_uuid("globex")?;

        let context = build_user_context(fixture.store(), user, &CancellationToken::new()).await?;

        assert_eq!(context.uuid, user);
        assert_eq!(context.user_type, "customer");
        assert_eq!(context.roles.as_slice(), ["buyer".to_string()]);
        assert!(context.active);

        let primary = context.primary_company.ok_or("expected a primary company")?;

        assert_eq!(primary.uuid, globex);
        assert_eq!(primary.trade_name, "globex");

        Ok(())
    }

    #[tokio::test]
    async fn inactive_memberships_are_not_primary() -> TestResult {
        let mut fixture = Fixture::new();

        fixture
            .user("alice")?
            .company("acme")?
            .company("globex")?
            .membership("alice", "acme")?
            .membership("alice", "globex")?;

        let user = fixture.user_uuid("alice")?;
        let acme = fixture.company_uuid("acme")?;
        let globex = fixture.company_uuid("globex")?;

        if let Some(membership) = fixture.store_mut().membership_mut(user, globex) {
            membership.active = false;
        }

        let context = build_user_context(fixture.store(), user, &CancellationToken::new()).await?;

        assert_eq!(
            context.primary_company.map(|company| company.uuid),
            Some(acme)
        );

        Ok(())
    }

    #[tokio::test]
    async fn user_without_memberships_has_no_primary_company() -> TestResult {
        let mut fixture = Fixture::new();

        fixture.user("alice")?;

        let user = fixture.user_uuid("alice")?;

        let context = build_user_context(fixture.store(), user, &CancellationToken::new()).await?;

        assert!(context.primary_company.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn context_serializes_roles_as_a_list() -> TestResult {
        let mut fixture = Fixture::new();

        fixture.user("alice")?;

        let user = fixture.user_uuid("alice")?;

        let context = build_user_context(fixture.store(), user, &CancellationToken::new()).await?;
        let value = serde_json::to_value(&context)?;

        assert_eq!(value.get("roles"), Some(&serde_json::json!(["buyer"])));
        assert_eq!(value.get("user_type"), Some(&serde_json::json!("customer")));
        assert_eq!(value.get("primary_company"), Some(&serde_json::Value::Null));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let fixture = Fixture::new();
        let user = UserUuid::new();

        let result = build_user_context(fixture.store(), user, &CancellationToken::new()).await;

        assert!(
            matches!(result, Err(ConditionsError::UserNotFound(uuid)) if uuid == user),
            "expected UserNotFound, got {result:?}"
        );
    }
}
