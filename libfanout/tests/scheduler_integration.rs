//! Scheduler behaviour against an on-disk database

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use libfanout::events::Event;
use libfanout::platforms::mock::MockPlatform;
use libfanout::types::{actions, LogFilter, NewPost, PostFilter, Schedule};
use libfanout::{CycleOutcome, Database, PlatformRegistry, Publisher, Scheduler, SchedulerState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::watch;

async fn setup(delay: Duration) -> Result<(TempDir, Arc<Database>, Arc<MockPlatform>, Scheduler)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Arc::new(Database::new(&db_path.to_string_lossy()).await?);

    let platform = Arc::new(MockPlatform::with_delay("feed", delay));
    let mut registry = PlatformRegistry::new();
    registry.register_instance("feed", platform.clone());

    let publisher = Publisher::new(Arc::clone(&db), Arc::new(registry));
    let scheduler = Scheduler::new(publisher, Duration::from_millis(25));
    Ok((temp_dir, db, platform, scheduler))
}

async fn count(db: &Database, action: &str) -> Result<usize> {
    Ok(db
        .list_logs(&LogFilter {
            action: Some(action.to_string()),
            post_id: None,
        })
        .await?
        .len())
}

#[tokio::test]
async fn test_overlapping_tick_produces_one_cycle_of_logs() -> Result<()> {
    let (_temp_dir, db, platform, scheduler) = setup(Duration::from_millis(100)).await?;
    for content in ["one", "two", "three"] {
        db.create_post(NewPost::new(content).with_platforms(["feed"]))
            .await?;
    }

    let running = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.tick(Utc::now()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Several ticks while the first cycle is busy; every one is dropped
    for _ in 0..3 {
        assert_eq!(scheduler.tick(Utc::now()).await?, CycleOutcome::Skipped);
    }

    match running.await?? {
        CycleOutcome::Completed(summary) => {
            assert_eq!(summary.published, 3);
            assert_eq!(summary.failed, 0);
        }
        CycleOutcome::Skipped => panic!("first tick should have run"),
    }

    assert_eq!(count(&db, actions::POST_PUBLISHED).await?, 3);
    assert_eq!(platform.publish_call_count(), 3);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_run_releases_posts_as_they_become_due() -> Result<()> {
    let (_temp_dir, db, _platform, scheduler) = setup(Duration::ZERO).await?;
    let mut events = scheduler_events(&scheduler);

    let due = db
        .create_post(NewPost::new("due").with_platforms(["feed"]))
        .await?;
    let soon = db
        .create_post(
            NewPost::new("soon")
                .with_platforms(["feed"])
                .scheduled(Schedule::At(Utc::now() + ChronoDuration::milliseconds(1500))),
        )
        .await?;
    let later = db
        .create_post(
            NewPost::new("later")
                .with_platforms(["feed"])
                .scheduled(Schedule::Date((Utc::now() + ChronoDuration::days(2)).date_naive())),
        )
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(db.get_post(&due).await?.unwrap().published);
    assert!(!db.get_post(&soon).await?.unwrap().published);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(db.get_post(&soon).await?.unwrap().published);

    shutdown_tx.send(true)?;
    runner.await?;

    assert!(!db.get_post(&later).await?.unwrap().published);
    assert_eq!(db.list_posts(PostFilter::unpublished()).await?.len(), 1);

    let mut completed = 0;
    loop {
        match events.try_recv() {
            Ok(Event::CycleCompleted { .. }) => completed += 1,
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert!(completed > 1);
    Ok(())
}

fn scheduler_events(scheduler: &Scheduler) -> libfanout::events::EventReceiver {
    scheduler.publisher().events().subscribe()
}
