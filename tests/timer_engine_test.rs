mod common;

use chrono::Duration;
use serde_json::json;

use codeverse::{
    backend::{Collection, Filter, Row, RowStore},
    config::Settings,
    domain::NewProblem,
    live::BindingMode,
    repository::RoundRepository,
    timer::RoundPhase,
};
use common::{admin_login, fixture, fixture_with, seed_round, settle, wait_for, Fixture};

fn problem(code: &str, order: i32, limit: Option<i64>) -> NewProblem {
    NewProblem {
        round_number: 1,
        code: code.to_string(),
        title: format!("Problem {}", code),
        statement: format!("Solve {}", code),
        guidance: None,
        sort_order: order,
        individual_time_limit_seconds: limit,
        points: Some(100),
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_runs_and_ends_on_server_time() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, true, "standard", Some(1)).await?;
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let rounds = fx.portal.bind_rounds().await?;
    let problems = fx.portal.bind_problems(Some(1)).await?;
    let mut status = fx.portal.watch_round(1, &rounds, &problems);
    assert_eq!(status.borrow().phase, RoundPhase::Waiting);
    assert_eq!(status.borrow().total_remaining, 60);

    fx.portal.round_control.start_timer(1).await?;
    wait_for(&mut status, |s| s.phase == RoundPhase::Running).await?;
    assert_eq!(status.borrow().total_remaining, 60);

    fx.clock.advance(Duration::seconds(30));
    wait_for(&mut status, |s| s.total_remaining == 30).await?;
    assert_eq!(status.borrow().phase, RoundPhase::Running);

    fx.clock.advance(Duration::seconds(30));
    wait_for(&mut status, |s| s.phase == RoundPhase::Ended).await?;
    assert_eq!(status.borrow().total_remaining, 0);

    // Without auto-stop the stored flag is left alone.
    let stored = fx.portal.round_repo.find(1).await?.unwrap();
    assert!(stored.is_timer_active());

    fx.portal.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_locked_round_stays_locked() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, false, "standard", Some(45)).await?;
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    let problems = fx.portal.bind_problems(Some(1)).await?;
    let status = fx.portal.watch_round(1, &rounds, &problems);

    fx.clock.advance(Duration::minutes(5));
    settle().await;
    settle().await;
    assert_eq!(status.borrow().phase, RoundPhase::Locked);
    assert_eq!(status.borrow().duration_secs, 45 * 60);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auto_stop_clears_timer_flag() -> anyhow::Result<()> {
    let mut settings = Settings::default();
    settings.timer.auto_stop_on_expiry = true;
    let fx = fixture_with(settings);
    seed_round(&fx.backend, 1, true, "standard", Some(1)).await?;
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let rounds = fx.portal.bind_rounds().await?;
    let problems = fx.portal.bind_problems(Some(1)).await?;
    let mut status = fx.portal.watch_round(1, &rounds, &problems);

    fx.portal.round_control.start_timer(1).await?;
    wait_for(&mut status, |s| s.phase == RoundPhase::Running).await?;

    fx.clock.advance(Duration::seconds(61));
    wait_for(&mut status, |s| s.phase != RoundPhase::Running).await?;

    let mut flag_cleared = false;
    for _ in 0..20 {
        settle().await;
        let stored = fx.portal.round_repo.find(1).await?.unwrap();
        if !stored.is_timer_active() {
            flag_cleared = true;
            break;
        }
    }
    assert!(flag_cleared);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sequential_round_walks_problems() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, true, "sequential", None).await?;
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let content = &fx.portal.content;
    content.create_problem(problem("A", 1, Some(600))).await?;
    content.create_problem(problem("C", 3, None)).await?;
    content.create_problem(problem("B", 2, Some(300))).await?;

    let rounds = fx.portal.bind_rounds().await?;
    let problems = fx.portal.bind_problems(Some(1)).await?;
    let mut status = fx.portal.watch_round(1, &rounds, &problems);
    assert_eq!(status.borrow().duration_secs, 600 + 300 + 600);

    fx.portal.round_control.start_timer(1).await?;
    wait_for(&mut status, |s| s.phase == RoundPhase::Running).await?;

    fx.clock.advance(Duration::seconds(650));
    wait_for(&mut status, |s| s.elapsed_secs == Some(650)).await?;
    {
        let current = status.borrow();
        let progress = current.sequential.unwrap();
        assert_eq!(progress.current_index, Some(1));
        assert_eq!(progress.problem_remaining, 250);
        assert_eq!(progress.total_remaining, 850);

        let snapshot = problems.snapshot();
        assert_eq!(current.current_problem(&snapshot).map(|p| p.code.as_str()), Some("B"));
    }

    fx.clock.advance(Duration::seconds(850));
    wait_for(&mut status, |s| s.phase == RoundPhase::Ended).await?;
    assert_eq!(status.borrow().sequential.unwrap().current_index, None);

    Ok(())
}

async fn seed_problem_row(fx: &Fixture, code: &str) -> anyhow::Result<()> {
    let mut row = Row::new();
    row.insert("round_number".to_string(), json!(1));
    row.insert("problem_code".to_string(), json!(code));
    row.insert("title".to_string(), json!(format!("Problem {}", code)));
    row.insert("statement".to_string(), json!(format!("Solve {}", code)));
    row.insert("sort_order".to_string(), json!(0));
    fx.backend.insert(Collection::Problems, row).await?;
    Ok(())
}

async fn unlock_round_one(fx: &Fixture) -> anyhow::Result<()> {
    let mut patch = Row::new();
    patch.insert("is_unlocked".to_string(), json!(true));
    fx.backend
        .update(Collection::Rounds, &[Filter::eq("round_number", 1)], patch)
        .await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unlock_reveals_masked_problems() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, false, "standard", Some(30)).await?;
    seed_problem_row(&fx, "A").await?;
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    let problems = fx.portal.bind_problems(Some(1)).await?;
    assert_eq!(problems.mode(), BindingMode::Manual);
    assert!(problems.snapshot()[0].statement.is_none());

    let mut status = fx.portal.watch_round(1, &rounds, &problems);
    assert_eq!(status.borrow().phase, RoundPhase::Locked);

    let mut listing = problems.subscribe();
    unlock_round_one(&fx).await?;
    wait_for(&mut status, |s| s.phase == RoundPhase::Waiting).await?;
    wait_for(&mut listing, |items| items.iter().all(|p| p.statement.is_some())).await?;
    assert_eq!(problems.snapshot()[0].statement.as_deref(), Some("Solve A"));

    fx.portal.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_watching_an_already_unlocked_round_reveals_problems() -> anyhow::Result<()> {
    let fx = fixture();
    seed_round(&fx.backend, 1, false, "standard", Some(30)).await?;
    seed_problem_row(&fx, "A").await?;
    fx.portal.start().await?;

    let rounds = fx.portal.bind_rounds().await?;
    let problems = fx.portal.bind_problems(Some(1)).await?;

    let mut round_list = rounds.subscribe();
    unlock_round_one(&fx).await?;
    wait_for(&mut round_list, |items| items.iter().any(|r| r.is_unlocked)).await?;
    assert!(problems.snapshot()[0].statement.is_none());

    let mut listing = problems.subscribe();
    let status = fx.portal.watch_round(1, &rounds, &problems);
    assert_eq!(status.borrow().phase, RoundPhase::Waiting);
    wait_for(&mut listing, |items| items.iter().all(|p| p.statement.is_some())).await?;

    fx.portal.shutdown();
    Ok(())
}
