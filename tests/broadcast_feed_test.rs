mod common;

use chrono::Duration;

use codeverse::domain::Severity;
use common::{admin_login, fixture, wait_for};

#[tokio::test(start_paused = true)]
async fn test_broadcast_visible_within_window() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let broadcasts = fx.portal.bind_broadcasts().await?;
    let feed = fx.portal.broadcast_feed(&broadcasts);
    let mut banner = feed.watch(fx.portal.child_token());

    fx.portal.broadcasts.send("Submissions are open", Severity::Info).await?;
    wait_for(&mut banner, |items| items.len() == 1).await?;

    fx.clock.advance(Duration::seconds(119));
    assert_eq!(feed.visible().len(), 1);

    fx.clock.advance(Duration::seconds(2));
    assert!(feed.visible().is_empty());
    wait_for(&mut banner, |items| items.is_empty()).await?;

    // Still active in the backend, only aged out of the banner.
    assert_eq!(broadcasts.snapshot().len(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_is_local_only() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let broadcasts = fx.portal.bind_broadcasts().await?;
    let mut rx = broadcasts.subscribe();
    let first = fx.portal.broadcasts.send("Clarification on problem B", Severity::Warning).await?;
    fx.portal.broadcasts.send("Lunch is served", Severity::Success).await?;
    wait_for(&mut rx, |items| items.len() == 2).await?;

    let feed = fx.portal.broadcast_feed(&broadcasts);
    let other_tab = fx.portal.broadcast_feed(&broadcasts);
    let mut banner = feed.watch(fx.portal.child_token());

    feed.dismiss(first.id);
    wait_for(&mut banner, |items| items.len() == 1).await?;
    assert_eq!(feed.visible()[0].message, "Lunch is served");
    assert_eq!(other_tab.visible().len(), 2);

    let stored = fx.portal.broadcasts.list_recent(10).await?;
    assert!(stored.iter().all(|b| b.is_active));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deactivated_broadcast_disappears() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;
    admin_login(&fx.portal).await?;

    let broadcasts = fx.portal.bind_broadcasts().await?;
    let feed = fx.portal.broadcast_feed(&broadcasts);
    let mut banner = feed.watch(fx.portal.child_token());

    let sent = fx.portal.broadcasts.send("Wrong announcement", Severity::Error).await?;
    wait_for(&mut banner, |items| items.len() == 1).await?;

    fx.portal.broadcasts.deactivate(sent.id).await?;
    wait_for(&mut banner, |items| items.is_empty()).await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_empty_message_rejected() -> anyhow::Result<()> {
    let fx = fixture();
    fx.portal.start().await?;
    assert!(fx.portal.broadcasts.send("hello", Severity::Info).await.is_err());

    admin_login(&fx.portal).await?;
    assert!(fx.portal.broadcasts.send("   ", Severity::Info).await.is_err());

    Ok(())
}
