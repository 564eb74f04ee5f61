//! Integration tests for rule resolution through the public service API.

use std::sync::Arc;

use rust_decimal::Decimal;
use testresult::TestResult;
use tokio_util::sync::CancellationToken;

use conditions::{
    fixtures::{Fixture, RawDiscount},
    prelude::*,
};

/// Condition A (priority 10, unbounded) holds R1; condition B (priority 20) holds R2 and
/// ends `b_until_days` from now (negative is in the past). Company C is assigned both.
fn two_conditions(b_until_days: i64) -> TestResult<Fixture> {
    let mut fixture = Fixture::new();
    let b_until = if b_until_days < 0 {
        fixture.days_ago(-b_until_days)?
    } else {
        fixture.days_from_now(b_until_days)?
    };

    fixture
        .user("buyer")?
        .company("c")?
        .membership("buyer", "c")?
        .condition("a", 10)?
        .condition_window("b", 20, None, Some(b_until))?
        .assign("c", "a")?
        .assign("c", "b")?
        .discount_rule("a", "r1", 5, DiscountType::Percentage, Decimal::TEN)?
        .discount_rule("b", "r2", 99, DiscountType::Percentage, Decimal::from(20))?;

    Ok(fixture)
}

fn service(fixture: &Fixture) -> StoreConditionsService<InMemoryEntityStore> {
    StoreConditionsService::new(Arc::new(fixture.store().clone()))
}

async fn discount_names(fixture: &Fixture) -> TestResult<Vec<String>> {
    let rules = service(fixture)
        .resolve_discount_rules(
            fixture.user_uuid("buyer")?,
            None,
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

    Ok(fixture.rule_names(rules.iter().map(|rule| rule.rule_uuid)))
}

#[tokio::test]
async fn expired_condition_is_excluded_despite_higher_priority() -> TestResult {
    let fixture = two_conditions(-1)?;

    assert_eq!(discount_names(&fixture).await?, ["r1"]);

    Ok(())
}

#[tokio::test]
async fn effective_condition_outranks_by_condition_priority() -> TestResult {
    let fixture = two_conditions(1)?;

    assert_eq!(discount_names(&fixture).await?, ["r2", "r1"]);

    Ok(())
}

#[tokio::test]
async fn deactivated_assignment_removes_condition_rules() -> TestResult {
    let mut fixture = two_conditions(1)?;
    let company = fixture.company_uuid("c")?;
    let condition = fixture.condition_uuid("a")?;

    if let Some(assignment) = fixture.store_mut().assignment_mut(company, condition) {
        assignment.active = false;
    }

    assert_eq!(discount_names(&fixture).await?, ["r2"]);

    let record = fixture.store().get_condition_with_rules(condition).await?;

    assert!(record.condition.active);
    assert_eq!(record.rules.len(), 1);

    Ok(())
}

#[tokio::test]
async fn out_of_range_percentage_is_excluded_but_siblings_kept() -> TestResult {
    let mut fixture = two_conditions(1)?;

    fixture
        .raw_rule(
            "a",
            "too-much",
            RuleKind::Discount,
            50,
            RawDiscount {
                kind: Some(DiscountType::Percentage),
                value: Some(Decimal::from(150)),
            },
        )?
        .discount_rule("a", "sibling", 40, DiscountType::Fixed, Decimal::ONE)?;

    assert_eq!(discount_names(&fixture).await?, ["r2", "sibling", "r1"]);

    Ok(())
}

#[tokio::test]
async fn user_without_memberships_gets_empty_lists() -> TestResult {
    let mut fixture = two_conditions(1)?;

    fixture.user("lurker")?;

    let service = service(&fixture);
    let user = fixture.user_uuid("lurker")?;
    let cancel = CancellationToken::new();

    let visibility = service
        .resolve_visibility_rules(user, None, fixture.now(), &cancel)
        .await?;
    let discounts = service
        .resolve_discount_rules(user, None, fixture.now(), &cancel)
        .await?;
    let conditions = service
        .resolve_user_conditions(user, fixture.now(), &cancel)
        .await?;

    assert!(visibility.is_empty());
    assert!(discounts.is_empty());
    assert!(conditions.is_empty());

    Ok(())
}

#[tokio::test]
async fn results_are_sorted_and_of_the_requested_kind() -> TestResult {
    let mut fixture = Fixture::new();

    fixture
        .user("buyer")?
        .company("acme")?
        .company("globex")?
        .membership("buyer", "acme")?
        .membership("buyer", "globex")?
        .condition("low", 1)?
        .condition("mid", 50)?
        .condition("high", 100)?
        .assign("acme", "low")?
        .assign("acme", "high")?
        .assign("globex", "mid")?
        .assign("globex", "high")?;

    for (condition, offset) in [("low", 0), ("mid", 10), ("high", 20)] {
        for priority in [1, 7, 3] {
            fixture
                .visibility_rule(condition, &format!("{condition}-show-{priority}"), priority)?
                .discount_rule(
                    condition,
                    &format!("{condition}-off-{priority}"),
                    priority + offset,
                    DiscountType::Percentage,
                    Decimal::from(priority),
                )?;
        }
    }

    let service = service(&fixture);
    let user = fixture.user_uuid("buyer")?;
    let cancel = CancellationToken::new();

    for kind in [RuleKind::Visibility, RuleKind::Discount] {
        let rules = match kind {
            RuleKind::Visibility => {
                service
                    .resolve_visibility_rules(user, None, fixture.now(), &cancel)
                    .await?
            }
            RuleKind::Discount => {
                service
                    .resolve_discount_rules(user, None, fixture.now(), &cancel)
                    .await?
            }
        };

        assert_eq!(rules.len(), 9);
        assert!(rules.iter().all(|rule| rule.kind == kind));
        assert!(
            rules
                .iter()
                .zip(rules.iter().skip(1))
                .all(|(a, b)| (a.condition_priority, a.priority) >= (b.condition_priority, b.priority)),
            "rules out of order for {kind}"
        );
    }

    Ok(())
}

#[tokio::test]
async fn company_filter_outside_memberships_is_empty() -> TestResult {
    let mut fixture = two_conditions(1)?;

    fixture
        .company("stranger")?
        .condition("theirs", 500)?
        .assign("stranger", "theirs")?
        .discount_rule("theirs", "not-yours", 1, DiscountType::Fixed, Decimal::ONE)?;

    let rules = service(&fixture)
        .resolve_discount_rules(
            fixture.user_uuid("buyer")?,
            Some(fixture.company_uuid("stranger")?),
            fixture.now(),
            &CancellationToken::new(),
        )
        .await?;

    assert!(rules.is_empty());

    Ok(())
}

#[tokio::test]
async fn unknown_user_is_not_found() -> TestResult {
    let fixture = two_conditions(1)?;
    let user = UserUuid::new();

    let result = service(&fixture)
        .resolve_discount_rules(user, None, fixture.now(), &CancellationToken::new())
        .await;

    assert!(
        matches!(result, Err(ConditionsError::UserNotFound(uuid)) if uuid == user),
        "expected UserNotFound, got {result:?}"
    );

    Ok(())
}
