//! Entity Store
//!
//! The read-side contract resolution depends on. Implementations decide how records
//! are fetched (SQL, cache, RPC); callers only see plain records or [`StoreError`].

use std::error::Error as StdError;

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::records::{
    AssignmentRecord, CompanyRecord, CompanyUuid, ConditionUuid, ConditionWithRules,
    MembershipRecord, UserRecord, UserUuid,
};

pub mod memory;

pub use memory::InMemoryEntityStore;

/// Boxed transport error carried by [`StoreError::Unavailable`].
pub type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// Entity store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,

    /// The store could not be reached or failed to answer.
    #[error("entity store unavailable")]
    Unavailable(#[source] BoxedSource),
}

impl StoreError {
    /// Wrap any transport error as [`StoreError::Unavailable`].
    pub fn unavailable<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Unavailable(Box::new(source))
    }
}

/// Read operations resolution performs against the entity store.
#[automock]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch a user.
    async fn get_user(&self, uuid: UserUuid) -> Result<UserRecord, StoreError>;

    /// Fetch a company.
    async fn get_company(&self, uuid: CompanyUuid) -> Result<CompanyRecord, StoreError>;

    /// List the active memberships held by a user, in any order.
    async fn get_active_memberships_for_user(
        &self,
        user: UserUuid,
    ) -> Result<Vec<MembershipRecord>, StoreError>;

    /// List the active assignments granted to a company, in any order.
    async fn get_active_assignments_for_company(
        &self,
        company: CompanyUuid,
    ) -> Result<Vec<AssignmentRecord>, StoreError>;

    /// Fetch a condition with all of its rules.
    async fn get_condition_with_rules(
        &self,
        uuid: ConditionUuid,
    ) -> Result<ConditionWithRules, StoreError>;
}
