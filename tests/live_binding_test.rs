mod common;

use std::time::Duration as StdDuration;

use serde_json::json;

use codeverse::{
    backend::{Collection, Filter, Row, RowStore},
    domain::Severity,
    live::{BindingMode, Visibility},
};
use common::{admin_login, fixture, seed_round, settle, wait_for};

async fn seed_problem(fx: &common::Fixture, round: i32, code: &str) -> anyhow::Result<()> {
    let mut row = Row::new();
    row.insert("round_number".to_string(), json!(round));
    row.insert("problem_code".to_string(), json!(code));
    row.insert("title".to_string(), json!(format!("Problem {}", code)));
    row.insert("statement".to_string(), json!("Read the input, print the answer."));
    row.insert("guidance".to_string(), json!("Think about parity."));
    row.insert("sort_order".to_string(), json!(1));
    fx.backend.insert(Collection::Problems, row).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_live_binding_refetches_on_change() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let broadcasts = fx.portal.bind_broadcasts().await?;
    assert_eq!(broadcasts.mode(), BindingMode::Live);
    assert!(broadcasts.snapshot().is_empty());

    let mut rx = broadcasts.subscribe();
    fx.portal.broadcasts.send("Round 2 starts in 5 minutes", Severity::Warning).await?;
    wait_for(&mut rx, |items| items.len() == 1).await?;
    assert_eq!(broadcasts.snapshot()[0].severity, Severity::Warning);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_change_right_after_bind_is_seen() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, false, "standard", Some(60)).await?;
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    assert_eq!(fx.backend.subscriber_count(), 1);

    // No yield between the bind and the writes.
    let mut patch = Row::new();
    patch.insert("is_unlocked".to_string(), json!(true));
    fx.backend
        .update(Collection::Rounds, &[Filter::eq("round_number", 1)], patch)
        .await?;
    seed_round(&fx.backend, 2, false, "standard", Some(60)).await?;

    let mut rx = rounds.subscribe();
    wait_for(&mut rx, |items| {
        items.len() == 2 && items.iter().any(|r| r.number == 1 && r.is_unlocked)
    })
    .await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hidden_page_pauses_subscription_after_grace() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, true, "standard", Some(60)).await?;
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 1);

    fx.portal.visibility.set(Visibility::Hidden);
    tokio::time::sleep(StdDuration::from_secs(31)).await;
    assert_eq!(fx.backend.subscriber_count(), 0);

    seed_round(&fx.backend, 2, false, "standard", Some(60)).await?;
    settle().await;
    assert_eq!(rounds.snapshot().len(), 1);

    let mut rx = rounds.subscribe();
    fx.portal.visibility.set(Visibility::Visible);
    wait_for(&mut rx, |items| items.len() == 2).await?;
    assert_eq!(fx.backend.subscriber_count(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_brief_hide_keeps_subscription() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    settle().await;

    fx.portal.visibility.set(Visibility::Hidden);
    tokio::time::sleep(StdDuration::from_secs(10)).await;
    fx.portal.visibility.set(Visibility::Visible);
    tokio::time::sleep(StdDuration::from_secs(30)).await;
    assert_eq!(fx.backend.subscriber_count(), 1);

    let mut rx = rounds.subscribe();
    seed_round(&fx.backend, 1, true, "standard", None).await?;
    wait_for(&mut rx, |items| items.len() == 1).await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_masked_problems_refresh_on_demand() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, false, "standard", Some(60)).await?;
    seed_problem(&fx, 1, "A").await?;
    fx.portal.start().await?;

    let problems = fx.portal.bind_problems(Some(1)).await?;
    assert_eq!(problems.mode(), BindingMode::Manual);
    assert_eq!(problems.collection(), Collection::ProblemsMasked);
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 0);

    let masked = problems.snapshot();
    assert_eq!(masked.len(), 1);
    assert!(masked[0].statement.is_none());
    assert!(masked[0].guidance.is_none());
    assert_eq!(masked[0].title, "Problem A");

    let mut patch = Row::new();
    patch.insert("is_unlocked".to_string(), json!(true));
    fx.backend
        .update(Collection::Rounds, &[Filter::eq("round_number", 1)], patch)
        .await?;
    settle().await;
    assert!(problems.snapshot()[0].statement.is_none());

    problems.refresh().await?;
    let revealed = problems.snapshot();
    assert_eq!(revealed[0].statement.as_deref(), Some("Read the input, print the answer."));
    assert_eq!(revealed[0].guidance.as_deref(), Some("Think about parity."));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_last_snapshot() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, true, "standard", Some(60)).await?;
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    assert_eq!(rounds.snapshot().len(), 1);

    fx.backend.set_available(false);
    assert!(rounds.refresh().await.is_err());
    assert_eq!(rounds.snapshot().len(), 1);

    fx.backend.set_available(true);
    rounds.refresh().await?;
    assert_eq!(rounds.snapshot().len(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_subscription() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    let hints = fx.portal.bind_hints(None).await?;
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 2);

    rounds.close();
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 1);
    assert!(rounds.refresh().await.is_err());

    drop(hints);
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_bindings_require_started_context() -> anyhow::Result<()> {
    let fx = fixture();
    assert!(fx.portal.bind_rounds().await.is_err());

    fx.portal.start().await?;
    let rounds = fx.portal.bind_rounds().await?;
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 1);

    fx.portal.shutdown();
    settle().await;
    assert_eq!(fx.backend.subscriber_count(), 0);
    assert!(fx.portal.bind_rounds().await.is_err());
    drop(rounds);

    Ok(())
}
