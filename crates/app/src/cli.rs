//! Subcommands

use clap::{Args, Subcommand};
use conditions::{
    errors::ConditionsError,
    records::{CompanyUuid, UserUuid},
    service::ConditionsService,
};
use jiff::Timestamp;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Conditions(#[from] ConditionsError),

    #[error("failed to encode output")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Effective conditions reachable by a user.
    UserConditions(UserArgs),

    /// Effective conditions assigned to a company.
    CompanyConditions(CompanyArgs),

    /// Ordered visibility rules of a user.
    VisibilityRules(RuleArgs),

    /// Ordered discount rules of a user.
    DiscountRules(RuleArgs),

    /// Expression evaluation context of a user.
    Context(UserArgs),

    /// Access state of a user.
    Access(UserArgs),
}

#[derive(Debug, Args)]
pub struct UserArgs {
    /// User UUID
    #[arg(long)]
    pub user: Uuid,
}

#[derive(Debug, Args)]
pub struct CompanyArgs {
    /// Company UUID
    #[arg(long)]
    pub company: Uuid,
}

#[derive(Debug, Args)]
pub struct RuleArgs {
    /// User UUID
    #[arg(long)]
    pub user: Uuid,

    /// Only rules reachable through this company
    #[arg(long)]
    pub company: Option<Uuid>,
}

impl Command {
    /// Run against `service` and return the result as JSON.
    ///
    /// # Errors
    ///
    /// Returns the service error, or an encoding error.
    pub async fn run(
        self,
        service: &dyn ConditionsService,
        point_in_time: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Value, CliError> {
        let value = match self {
            Self::UserConditions(args) => serde_json::to_value(
                service
                    .resolve_user_conditions(UserUuid::from(args.user), point_in_time, cancel)
                    .await?,
            )?,
            Self::CompanyConditions(args) => serde_json::to_value(
                service
                    .resolve_company_conditions(
                        CompanyUuid::from(args.company),
                        point_in_time,
                        cancel,
                    )
                    .await?,
            )?,
            Self::VisibilityRules(args) => serde_json::to_value(
                service
                    .resolve_visibility_rules(
                        args.user.into(),
                        args.company.map(CompanyUuid::from),
                        point_in_time,
                        cancel,
                    )
                    .await?,
            )?,
            Self::DiscountRules(args) => serde_json::to_value(
                service
                    .resolve_discount_rules(
                        args.user.into(),
                        args.company.map(CompanyUuid::from),
                        point_in_time,
                        cancel,
                    )
                    .await?,
            )?,
            Self::Context(args) => serde_json::to_value(
                service
                    .build_user_context(args.user.into(), cancel)
                    .await?,
            )?,
            Self::Access(args) => serde_json::to_value(
                service
                    .check_access(args.user.into(), point_in_time, cancel)
                    .await?,
            )?,
        };

        Ok(value)
    }
}
