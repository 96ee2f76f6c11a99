//! End-to-end collection runs against a scripted catalog

mod common;

use anyhow::Result;
use rstest::rstest;
use std::time::Duration;

use common::{Harness, json_page, names, xml_page};
use vod_collector::application::{RegistryError, derive_vod_id};
use vod_collector::domain::{CollectionParams, EventKind, JobSnapshot, JobStatus, NewSource, VideoFilter, WireFormat};

fn params(update_existing: bool) -> CollectionParams {
    CollectionParams {
        update_existing,
        workers: 2,
        max_retries: 1,
        ..CollectionParams::default()
    }
}

async fn run_job(harness: &Harness, params: CollectionParams) -> Result<JobSnapshot> {
    let id = harness.service.start_job(harness.source_id, params).await?;
    let snapshot = harness.service.wait_for_job(id).await;
    Ok(snapshot.expect("job is registered"))
}

async fn stored(harness: &Harness) -> Result<u64> {
    harness.service.count_videos(&VideoFilter::default()).await
}

#[tokio::test]
async fn two_pages_of_the_same_records_create_then_skip() -> Result<()> {
    let harness = Harness::new().await?;
    let batch = names("Show", 5);
    harness.catalog.set_page(1, json_page(1, 2, &batch));
    harness.catalog.set_page(2, json_page(2, 2, &batch));

    let snapshot = run_job(&harness, params(true)).await?;

    assert_eq!(snapshot.status, JobStatus::Finished);
    assert_eq!((snapshot.success, snapshot.skip, snapshot.failed), (5, 5, 0));
    assert_eq!(snapshot.total_pages, 2);
    assert_eq!(stored(&harness).await?, 5);
    Ok(())
}

#[tokio::test]
async fn second_run_without_updates_only_skips() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(1, json_page(1, 1, &names("Film", 6)));

    let first = run_job(&harness, params(false)).await?;
    assert_eq!((first.success, first.skip), (6, 0));

    let second = run_job(&harness, params(false)).await?;
    assert_eq!(second.status, JobStatus::Finished);
    assert_eq!((second.success, second.skip, second.failed), (0, 6, 0));
    assert_eq!(second.duplicate_streak, 6);
    assert_eq!(stored(&harness).await?, 6);
    Ok(())
}

#[tokio::test]
async fn concurrent_pages_never_duplicate_a_name() -> Result<()> {
    let harness = Harness::new().await?;
    let shared = names("Shared", 4);
    harness.catalog.set_page(1, json_page(1, 6, &names("Lead", 2)));
    for page in 2..=6 {
        harness.catalog.set_page(page, json_page(page, 6, &shared));
    }

    let snapshot = run_job(
        &harness,
        CollectionParams {
            workers: 5,
            ..params(false)
        },
    )
    .await?;

    assert_eq!(snapshot.status, JobStatus::Finished);
    assert_eq!(snapshot.success, 6);
    assert_eq!(snapshot.skip, 16);
    assert_eq!(stored(&harness).await?, 6);
    for name in &shared {
        let matching = harness
            .service
            .videos(&VideoFilter::default())
            .await?
            .into_iter()
            .filter(|v| &v.vod_name == name)
            .count();
        assert_eq!(matching, 1, "{name} stored more than once");
    }
    Ok(())
}

#[rstest]
#[case(19, JobStatus::Finished)]
#[case(20, JobStatus::StoppedThreshold)]
#[case(25, JobStatus::StoppedThreshold)]
#[tokio::test]
async fn duplicate_streak_stops_at_threshold(#[case] duplicates: usize, #[case] expected: JobStatus) -> Result<()> {
    let harness = Harness::new().await?;
    let batch = names("Dup", duplicates);
    harness.catalog.set_page(1, json_page(1, 1, &batch));
    run_job(&harness, params(false)).await?;

    for page in 1..=3 {
        harness.catalog.set_page(page, json_page(page, 3, &batch));
    }
    harness.catalog.clear_requests();

    let snapshot = run_job(
        &harness,
        CollectionParams {
            end_page: Some(1),
            ..params(false)
        },
    )
    .await?;
    assert_eq!(snapshot.status, expected);
    assert_eq!(snapshot.skip, duplicates as u64);
    assert_eq!(snapshot.duplicate_streak as usize, duplicates);
    Ok(())
}

#[tokio::test]
async fn no_page_is_dispatched_after_auto_stop() -> Result<()> {
    let harness = Harness::new().await?;
    let batch = names("Seen", 20);
    harness.catalog.set_page(1, json_page(1, 1, &batch));
    run_job(&harness, params(false)).await?;

    for page in 1..=4 {
        harness.catalog.set_page(page, json_page(page, 4, &batch));
    }
    harness.catalog.clear_requests();

    let snapshot = run_job(&harness, params(false)).await?;
    assert_eq!(snapshot.status, JobStatus::StoppedThreshold);
    assert_eq!(harness.catalog.requested_pages(), vec![1]);

    let events = harness.service.recent_events(Some(EventKind::Collect), 500).await?;
    assert!(events.iter().any(|e| e.message.contains("auto-stopped")));
    Ok(())
}

#[tokio::test]
async fn created_record_resets_the_streak() -> Result<()> {
    let harness = Harness::new().await?;
    let old = names("Old", 3);
    harness.catalog.set_page(1, json_page(1, 1, &old));
    run_job(&harness, params(false)).await?;

    let mut mixed = old.clone();
    mixed.push("Brand New".to_string());
    harness.catalog.set_page(1, json_page(1, 1, &mixed));
    let snapshot = run_job(&harness, params(false)).await?;

    assert_eq!((snapshot.success, snapshot.skip), (1, 3));
    assert_eq!(snapshot.duplicate_streak, 0);
    Ok(())
}

#[tokio::test]
async fn derived_ids_are_stable_across_stores() -> Result<()> {
    let mut ids = Vec::new();
    for _ in 0..2 {
        let harness = Harness::new().await?;
        harness.catalog.set_page(1, json_page(1, 1, &names("Nameless", 1)));
        run_job(&harness, params(false)).await?;
        let videos = harness.service.videos(&VideoFilter::default()).await?;
        ids.push(videos[0].vod_id);
    }
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[0], derive_vod_id("Nameless 1"));
    Ok(())
}

#[tokio::test]
async fn records_are_normalized_before_storage() -> Result<()> {
    let harness = Harness::new().await?;
    harness.service.bind_category(harness.source_id, 1, 9).await?;
    harness.catalog.set_page(1, json_page(1, 1, &names("Clean", 1)));
    run_job(&harness, params(false)).await?;

    let video = harness.service.videos(&VideoFilter::default()).await?.remove(0);
    assert_eq!(video.type_id, 9);
    assert_eq!(video.type_name, "Movie");
    assert_eq!(video.fields.vod_play_url, "https://cdn.example/Clean 1/1.m3u8");
    assert_eq!(video.fields.vod_play_from, "m3u8");
    Ok(())
}

#[tokio::test]
async fn blank_names_fail_without_stopping_the_job() -> Result<()> {
    let harness = Harness::new().await?;
    let body = serde_json::json!({
        "code": 1,
        "pagecount": 1,
        "list": [{"vod_name": "  "}, {"vod_id": 3}, {"vod_name": "Kept"}],
    });
    harness.catalog.set_page(1, body.to_string());

    let snapshot = run_job(&harness, params(false)).await?;
    assert_eq!(snapshot.status, JobStatus::Finished);
    assert_eq!((snapshot.success, snapshot.failed), (1, 2));
    assert_eq!(snapshot.errors.len(), 2);
    assert_eq!(stored(&harness).await?, 1);
    Ok(())
}

#[tokio::test]
async fn failed_page_counts_once_and_job_continues() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(1, json_page(1, 3, &names("P1", 2)));
    harness.catalog.set_page(3, json_page(3, 3, &names("P3", 2)));

    let snapshot = run_job(&harness, params(false)).await?;
    assert_eq!(snapshot.status, JobStatus::Finished);
    assert_eq!((snapshot.success, snapshot.failed), (4, 1));
    assert!(snapshot.errors.iter().any(|e| e.starts_with("page 2")));
    Ok(())
}

#[tokio::test]
async fn first_page_failure_finishes_with_zero_progress() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(1, "   ");

    let snapshot = run_job(&harness, params(false)).await?;
    assert_eq!(snapshot.status, JobStatus::Finished);
    assert_eq!(snapshot.processed(), 0);
    assert_eq!(snapshot.errors.len(), 1);
    Ok(())
}

#[tokio::test]
async fn upstream_error_code_fails_the_page() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(1, json_page(1, 2, &names("Ok", 1)));
    harness.catalog.set_page(2, r#"{"code": 0, "msg": "rate limited"}"#);

    let snapshot = run_job(&harness, params(false)).await?;
    assert_eq!((snapshot.success, snapshot.failed), (1, 1));
    assert!(snapshot.errors[0].contains("rate limited"));
    Ok(())
}

#[tokio::test]
async fn manual_stop_wins_and_halts_dispatch() -> Result<()> {
    let harness = Harness::new().await?;
    for page in 1..=5 {
        harness.catalog.set_page(page, json_page(page, 5, &names(&format!("Page{page}"), 3)));
    }
    harness.catalog.set_delay(Duration::from_millis(200));

    let id = harness.service.start_job(harness.source_id, params(false)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.service.stop_job(id).await);

    let snapshot = harness.service.wait_for_job(id).await.expect("registered");
    assert_eq!(snapshot.status, JobStatus::StoppedManual);
    assert_eq!(snapshot.processed(), 0);
    assert_eq!(harness.catalog.requested_pages(), vec![1]);

    // Already terminal
    assert!(!harness.service.stop_job(id).await);
    assert!(!harness.service.stop_job(9_999).await);
    Ok(())
}

#[tokio::test]
async fn registry_rejects_unknown_and_inactive_sources() -> Result<()> {
    let harness = Harness::new().await?;
    let unknown = harness.service.start_job(404, params(false)).await;
    assert!(matches!(unknown, Err(RegistryError::UnknownSource(404))));

    let inactive = harness
        .service
        .add_source(&NewSource::new("Off", common::SOURCE_URL, WireFormat::Json))
        .await?;
    harness.service.set_source_active(inactive, false).await?;
    let result = harness.service.start_job(inactive, params(false)).await;
    assert!(matches!(result, Err(RegistryError::InactiveSource(_))));
    Ok(())
}

#[tokio::test]
async fn cleanup_removes_only_terminal_jobs() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(1, json_page(1, 1, &names("One", 1)));
    let done = run_job(&harness, params(false)).await?;

    harness.catalog.set_delay(Duration::from_millis(300));
    let running = harness.service.start_job(harness.source_id, params(false)).await?;

    assert_eq!(harness.service.all_job_statuses().await.len(), 2);
    assert_eq!(harness.service.cleanup_finished_jobs().await, 1);
    assert!(harness.service.job_status(done.id).await.is_none());
    assert!(harness.service.job_status(running).await.is_some());

    harness.service.shutdown().await;
    let stopped = harness.service.job_status(running).await.expect("still registered");
    assert!(stopped.status.is_terminal());
    Ok(())
}

#[tokio::test]
async fn job_lifecycle_is_logged() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(1, json_page(1, 1, &names("Logged", 2)));
    run_job(&harness, params(false)).await?;

    let events = harness.service.recent_events(Some(EventKind::Collect), 100).await?;
    let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.starts_with("Collection started")));
    assert!(messages.iter().any(|m| m.starts_with("Page 1 collected")));
    assert!(messages.iter().any(|m| m.starts_with("Collection finished")));
    let collected = events
        .iter()
        .filter(|e| e.details.as_ref().and_then(|d| d.get("result")).and_then(|r| r.as_str()) == Some("success"))
        .count();
    assert_eq!(collected, 2);
    Ok(())
}

#[tokio::test]
async fn worker_page_crossing_the_threshold_stops_dispatch() -> Result<()> {
    let harness = Harness::new().await?;
    let batch = names("Rerun", 10);
    harness.catalog.set_page(1, json_page(1, 1, &batch));
    run_job(&harness, params(false)).await?;

    for page in 1..=5 {
        harness.catalog.set_page(page, json_page(page, 5, &batch));
    }
    harness.catalog.clear_requests();

    let snapshot = run_job(
        &harness,
        CollectionParams {
            workers: 1,
            ..params(false)
        },
    )
    .await?;

    assert_eq!(snapshot.status, JobStatus::StoppedThreshold);
    assert_eq!(snapshot.skip, 20);
    assert_eq!(harness.catalog.requested_pages(), vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn xml_source_is_collected_end_to_end() -> Result<()> {
    let harness = Harness::new().await?;
    let source_id = harness
        .service
        .add_source(&NewSource::new("Xml feed", common::SOURCE_URL, WireFormat::Xml))
        .await?;
    harness.catalog.set_page(1, xml_page(1, 2, &names("Xml A", 3)));
    harness.catalog.set_page(2, xml_page(2, 2, &names("Xml B", 2)));

    let id = harness.service.start_job(source_id, params(false)).await?;
    let snapshot = harness.service.wait_for_job(id).await.expect("job is registered");

    assert_eq!(snapshot.status, JobStatus::Finished);
    assert_eq!((snapshot.success, snapshot.skip, snapshot.failed), (5, 0, 0));
    let queries = harness.catalog.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().all(|q| q.get("at").map(String::as_str) == Some("xml")));

    let videos = harness.service.videos(&VideoFilter::default()).await?;
    let first = videos.iter().find(|v| v.vod_name == "Xml A 1").expect("stored");
    assert_eq!(first.vod_id, 1000);
    assert_eq!(first.type_name, "Movie");
    assert_eq!(first.fields.vod_play_from, "m3u8");
    assert_eq!(first.fields.vod_play_url, "https://cdn.example/0/1.m3u8");
    Ok(())
}

#[tokio::test]
async fn search_returns_matches_without_storing_them() -> Result<()> {
    let harness = Harness::new().await?;
    harness.catalog.set_page(2, json_page(2, 3, &names("Hit", 3)));

    let page = harness.service.search_source(harness.source_id, "Hit", 2, Some(7)).await?;
    assert_eq!(page.list.len(), 3);
    assert_eq!(page.pagecount, 3);
    assert_eq!(stored(&harness).await?, 0);

    let queries = harness.catalog.queries();
    let query = queries.last().expect("one request");
    assert_eq!(query.get("ac").map(String::as_str), Some("videolist"));
    assert_eq!(query.get("wd").map(String::as_str), Some("Hit"));
    assert_eq!(query.get("t").map(String::as_str), Some("7"));
    assert_eq!(query.get("pg").map(String::as_str), Some("2"));
    Ok(())
}

#[tokio::test]
async fn categories_are_listed_from_the_source() -> Result<()> {
    let harness = Harness::new().await?;
    let body = serde_json::json!({
        "code": 1,
        "msg": "ok",
        "list": [],
        "class": [
            {"type_id": 1, "type_pid": 0, "type_name": "Movie"},
            {"type_id": 6, "type_pid": 1, "type_name": "Drama"},
        ],
    });
    harness.catalog.set_page(1, body.to_string());

    let categories = harness.service.list_categories(harness.source_id).await?;
    let listed: Vec<_> = categories.iter().map(|c| (c.type_id, c.type_name.as_str())).collect();
    assert_eq!(listed, vec![(1, "Movie"), (6, "Drama")]);

    let queries = harness.catalog.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].get("ac").map(String::as_str), Some("list"));
    assert!(!queries[0].contains_key("wd"));

    assert!(harness.service.list_categories(9999).await.is_err());
    Ok(())
}
