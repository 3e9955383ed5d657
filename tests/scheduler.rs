mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;

use jobharvest::error::ScrapeError;
use jobharvest::models::source::{SourceDescriptor, SourceKind};
use jobharvest::scheduler::Scheduler;
use jobharvest::store::MemoryStore;

use common::{rss_feed, runner};

fn feed_source(id: i32, minutes: i32) -> SourceDescriptor {
    SourceDescriptor::new(id, &format!("Feed {id}"), "https://jobs.example.org/feed.rss", SourceKind::XmlFeed)
        .with_interval(minutes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconcile_tracks_active_sources() {
    let mut paused = feed_source(3, 30);
    paused.is_active = false;
    let store = Arc::new(MemoryStore::with_sources([
        feed_source(1, 60),
        feed_source(2, 15),
        paused,
    ]));
    let scheduler = Scheduler::new(runner(store.clone())).await.unwrap();

    let report = scheduler.reconcile().await.unwrap();
    assert_eq!(report.created, vec![1, 2]);
    assert!(report.removed.is_empty());
    let tasks = scheduler.tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].cron, "0 0 * * * *");
    assert_eq!(tasks[1].cron, "0 */15 * * * *");

    let again = scheduler.reconcile().await.unwrap();
    assert!(!again.changed());
    assert_eq!(again.unchanged, 2);

    store.edit_source(2, |s| s.scrape_interval_minutes = 240).await;
    store.edit_source(1, |s| s.is_active = false).await;
    store.edit_source(3, |s| s.is_active = true).await;
    let report = scheduler.reconcile().await.unwrap();
    assert_eq!(report.created, vec![3]);
    assert_eq!(report.replaced, vec![2]);
    assert_eq!(report.removed, vec![1]);

    let tasks = scheduler.tasks();
    assert_eq!(
        tasks.iter().map(|t| t.source_id).collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert_eq!(tasks[0].interval_minutes, 240);
    assert_eq!(tasks[0].cron, "0 0 */4 * * *");

    store.remove_source(3).await;
    let report = scheduler.reconcile().await.unwrap();
    assert_eq!(report.removed, vec![3]);

    assert_eq!(scheduler.tasks().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn intervals_below_minimum_are_clamped() {
    let store = Arc::new(MemoryStore::with_sources([feed_source(1, 1)]));
    let scheduler = Scheduler::new(runner(store)).await.unwrap();

    scheduler.reconcile().await.unwrap();
    let tasks = scheduler.tasks();
    assert_eq!(tasks[0].interval_minutes, 5);
    assert_eq!(tasks[0].cron, "0 */5 * * * *");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deactivation_cancels_the_pass_in_flight() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow.rss");
            then.status(200)
                .delay(Duration::from_secs(5))
                .body(rss_feed(&[("x-1", "Chauffeur")]));
        })
        .await;

    let source = SourceDescriptor::new(4, "Slow feed", &server.url("/slow.rss"), SourceKind::XmlFeed);
    let store = Arc::new(MemoryStore::with_sources([source]));
    let scheduler = Arc::new(Scheduler::new(runner(store.clone())).await.unwrap());
    scheduler.reconcile().await.unwrap();

    let pass = tokio::spawn({
        let runner = scheduler.runner().clone();
        async move { runner.trigger(4).await }
    });
    while !scheduler.runner().is_running(4) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    store.edit_source(4, |s| s.is_active = false).await;
    let report = scheduler.reconcile().await.unwrap();
    assert_eq!(report.removed, vec![4]);

    let outcome = tokio::time::timeout(Duration::from_secs(2), pass)
        .await
        .expect("cancelled pass should end promptly")
        .unwrap();
    assert!(matches!(outcome, Err(ScrapeError::Cancelled)));
    assert!(scheduler.runner().running().is_empty());
    assert_eq!(store.job_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deactivated_source_stops_firing() {
    let server = MockServer::start_async().await;
    let feed = server
        .mock_async(|when, then| {
            when.method(GET).path("/tick.rss");
            then.status(200).body(rss_feed(&[("t-1", "Schoonmaker")]));
        })
        .await;

    let source = SourceDescriptor::new(6, "Ticking feed", &server.url("/tick.rss"), SourceKind::XmlFeed);
    let store = Arc::new(MemoryStore::with_sources([source]));
    let scheduler = Scheduler::with_cadence(runner(store.clone()), |_| "* * * * * *".to_string())
        .await
        .unwrap();
    scheduler.reconcile().await.unwrap();
    scheduler.start().await.unwrap();

    let fired = tokio::time::timeout(Duration::from_secs(5), async {
        while store.jobs(6).await.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(fired.is_ok(), "scheduled pass never ran");
    assert!(feed.hits_async().await >= 1);

    store.edit_source(6, |s| s.is_active = false).await;
    let report = scheduler.reconcile().await.unwrap();
    assert_eq!(report.removed, vec![6]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = feed.hits_async().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(feed.hits_async().await, settled);
    assert!(scheduler.tasks().is_empty());
}
