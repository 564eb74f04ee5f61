//! PostgreSQL Entity Store

use async_trait::async_trait;
use conditions::{
    discounts::DiscountType,
    records::{
        AssignmentRecord, CompanyRecord, CompanyUuid, ConditionRecord, ConditionUuid,
        ConditionWithRules, MembershipRecord, RuleKind, RuleRecord, UserRecord, UserUuid,
    },
    store::{EntityStore, StoreError},
};
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query_as};
use thiserror::Error;
use tracing::Span;
use uuid::Uuid;

const GET_USER_SQL: &str = include_str!("sql/get_user.sql");
const GET_COMPANY_SQL: &str = include_str!("sql/get_company.sql");
const GET_ACTIVE_MEMBERSHIPS_FOR_USER_SQL: &str =
    include_str!("sql/get_active_memberships_for_user.sql");
const GET_ACTIVE_ASSIGNMENTS_FOR_COMPANY_SQL: &str =
    include_str!("sql/get_active_assignments_for_company.sql");
const GET_CONDITION_SQL: &str = include_str!("sql/get_condition.sql");
const LIST_CONDITION_RULES_SQL: &str = include_str!("sql/list_condition_rules.sql");

/// A text column held a value outside its enumeration.
#[derive(Debug, Error)]
#[error("unknown {column} value {value:?}")]
struct UnknownVariant {
    column: &'static str,
    value: String,
}

/// Decoded row wrapper; records live in the core crate.
struct Decoded<T>(T);

impl<T> Decoded<T> {
    fn into_inner(self) -> T {
        self.0
    }
}

fn decode_err(column: &'static str, value: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(UnknownVariant { column, value }),
    }
}

impl<'r> FromRow<'r, PgRow> for Decoded<UserRecord> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let roles: Vec<String> = row.try_get("roles")?;

        Ok(Self(UserRecord {
            uuid: row.try_get::<Uuid, _>("uuid")?.into(),
            name: row.try_get("name")?,
            user_type: row.try_get("user_type")?,
            roles: SmallVec::from_vec(roles),
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Decoded<CompanyRecord> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(CompanyRecord {
            uuid: row.try_get::<Uuid, _>("uuid")?.into(),
            legal_name: row.try_get("legal_name")?,
            trade_name: row.try_get("trade_name")?,
            tax_id: row.try_get("tax_id")?,
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Decoded<MembershipRecord> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(MembershipRecord {
            user_uuid: row.try_get::<Uuid, _>("user_uuid")?.into(),
            company_uuid: row.try_get::<Uuid, _>("company_uuid")?.into(),
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Decoded<AssignmentRecord> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(AssignmentRecord {
            company_uuid: row.try_get::<Uuid, _>("company_uuid")?.into(),
            condition_uuid: row.try_get::<Uuid, _>("condition_uuid")?.into(),
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Decoded<ConditionRecord> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(ConditionRecord {
            uuid: row.try_get::<Uuid, _>("uuid")?.into(),
            name: row.try_get("name")?,
            priority: row.try_get("priority")?,
            valid_from: row
                .try_get::<Option<SqlxTimestamp>, _>("valid_from")?
                .map(SqlxTimestamp::to_jiff),
            valid_until: row
                .try_get::<Option<SqlxTimestamp>, _>("valid_until")?
                .map(SqlxTimestamp::to_jiff),
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Decoded<RuleRecord> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let kind = RuleKind::parse(&kind).ok_or_else(|| decode_err("kind", kind))?;

        let discount_type = match row.try_get::<Option<String>, _>("discount_type")? {
            Some(value) => Some(
                DiscountType::parse(&value).ok_or_else(|| decode_err("discount_type", value))?,
            ),
            None => None,
        };

        Ok(Self(RuleRecord {
            uuid: row.try_get::<Uuid, _>("uuid")?.into(),
            condition_uuid: row.try_get::<Uuid, _>("condition_uuid")?.into(),
            kind,
            expression: row.try_get("expression")?,
            priority: row.try_get("priority")?,
            discount_type,
            discount_value: row.try_get::<Option<Decimal>, _>("discount_value")?,
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}

/// Map a query failure onto the store contract.
fn store_error(error: sqlx::Error) -> StoreError {
    if matches!(error, sqlx::Error::RowNotFound) {
        return StoreError::NotFound;
    }

    StoreError::unavailable(error)
}

/// Read-only [`EntityStore`] over a `PostgreSQL` pool.
///
/// Queries run on the pool rather than a shared transaction so concurrent lookups from
/// one resolution proceed in parallel.
#[derive(Debug, Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    #[tracing::instrument(name = "conditions.store.get_user", skip(self, uuid), fields(user = %uuid), err)]
    async fn get_user(&self, uuid: UserUuid) -> Result<UserRecord, StoreError> {
        query_as::<Postgres, Decoded<UserRecord>>(GET_USER_SQL)
            .bind(uuid.into_uuid())
            .fetch_one(&self.pool)
            .await
            .map(Decoded::into_inner)
            .map_err(store_error)
    }

    #[tracing::instrument(
        name = "conditions.store.get_company",
        skip(self, uuid),
        fields(company = %uuid),
        err
    )]
    async fn get_company(&self, uuid: CompanyUuid) -> Result<CompanyRecord, StoreError> {
        query_as::<Postgres, Decoded<CompanyRecord>>(GET_COMPANY_SQL)
            .bind(uuid.into_uuid())
            .fetch_one(&self.pool)
            .await
            .map(Decoded::into_inner)
            .map_err(store_error)
    }

    #[tracing::instrument(
        name = "conditions.store.get_active_memberships_for_user",
        skip(self, user),
        fields(user = %user, membership_count = tracing::field::Empty),
        err
    )]
    async fn get_active_memberships_for_user(
        &self,
        user: UserUuid,
    ) -> Result<Vec<MembershipRecord>, StoreError> {
        let memberships: Vec<MembershipRecord> =
            query_as::<Postgres, Decoded<MembershipRecord>>(GET_ACTIVE_MEMBERSHIPS_FOR_USER_SQL)
                .bind(user.into_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?
                .into_iter()
                .map(Decoded::into_inner)
                .collect();

        Span::current().record("membership_count", memberships.len());

        Ok(memberships)
    }

    #[tracing::instrument(
        name = "conditions.store.get_active_assignments_for_company",
        skip(self, company),
        fields(company = %company, assignment_count = tracing::field::Empty),
        err
    )]
    async fn get_active_assignments_for_company(
        &self,
        company: CompanyUuid,
    ) -> Result<Vec<AssignmentRecord>, StoreError> {
        let assignments: Vec<AssignmentRecord> =
            query_as::<Postgres, Decoded<AssignmentRecord>>(GET_ACTIVE_ASSIGNMENTS_FOR_COMPANY_SQL)
                .bind(company.into_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?
                .into_iter()
                .map(Decoded::into_inner)
                .collect();

        Span::current().record("assignment_count", assignments.len());

        Ok(assignments)
    }

    #[tracing::instrument(
        name = "conditions.store.get_condition_with_rules",
        skip(self, uuid),
        fields(condition = %uuid, rule_count = tracing::field::Empty),
        err
    )]
    async fn get_condition_with_rules(
        &self,
        uuid: ConditionUuid,
    ) -> Result<ConditionWithRules, StoreError> {
        let (condition, rules) = tokio::try_join!(
            query_as::<Postgres, Decoded<ConditionRecord>>(GET_CONDITION_SQL)
                .bind(uuid.into_uuid())
                .fetch_one(&self.pool),
            query_as::<Postgres, Decoded<RuleRecord>>(LIST_CONDITION_RULES_SQL)
                .bind(uuid.into_uuid())
                .fetch_all(&self.pool),
        )
        .map_err(store_error)?;

        Span::current().record("rule_count", rules.len());

        Ok(ConditionWithRules {
            condition: condition.into_inner(),
            rules: rules.into_iter().map(Decoded::into_inner).collect(),
        })
    }
}
