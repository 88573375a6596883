//! Integration tests for the live snapshot source.
//!
//! Each test serves canned responses from a loopback axum server so the
//! HTTP client, status handling, timeout mapping and persistence run for
//! real without reaching the Eurostat portal.

#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::get;
use flate2::Compression;
use flate2::write::GzEncoder;
use mortality_core::{
    ArchiveError, LiveSource, SnapshotArchive, SnapshotError, SnapshotSource, SourceChain,
    SourceError, snapshot_file_name,
};

const DATASET: &str = "age,sex,unit,geo\\time\t2021W03\t2021W02\t2021W01\t2021W99\n\
TOTAL,F,NR,AD\t:\t:\t1\t0\n\
TOTAL,T,NR,PL\t212 p\t123\t:\t0\n";

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn portal() -> Router {
    let payload = gzip(DATASET);
    let trickled = payload.clone();
    Router::new()
        .route(
            "/demo_r_mwk_05.tsv.gz",
            get(move || {
                let payload = payload.clone();
                async move { payload }
            }),
        )
        .route(
            "/trickle",
            get(move || {
                let payload = trickled.clone();
                async move {
                    Body::from_stream(futures::stream::once(async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        Ok::<_, std::io::Error>(payload)
                    }))
                }
            }),
        )
        .route("/plain", get(|| async { "not gzip" }))
        .route(
            "/unavailable",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        )
}

#[tokio::test]
async fn fetches_and_parses_live_dataset() {
    let base = serve(portal()).await;
    let source = LiveSource::new(format!("{base}/demo_r_mwk_05.tsv.gz"), Duration::from_secs(5))
        .unwrap();

    let before = chrono::Utc::now();
    let snapshot = source.fetch().await.unwrap();

    assert!(snapshot.captured_at() >= before);
    assert_eq!(snapshot.len(), 2);

    let pl = snapshot.weekly_deaths("PL", "TOTAL", "T", 2021, 2021).unwrap();
    let pl: Vec<(u8, Option<u32>)> = pl.iter().map(|row| (row.week, row.deaths)).collect();
    assert_eq!(pl, vec![(1, None), (2, Some(123)), (3, Some(212))]);
}

#[tokio::test]
async fn capture_time_follows_the_last_body_byte() {
    let base = serve(portal()).await;
    let source = LiveSource::new(format!("{base}/trickle"), Duration::from_secs(5)).unwrap();

    let before = chrono::Utc::now();
    let snapshot = source.fetch().await.unwrap();

    assert_eq!(snapshot.len(), 2);
    let body_sent = before
        .checked_add_signed(chrono::Duration::milliseconds(300))
        .unwrap();
    assert!(snapshot.captured_at() >= body_sent);
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let base = serve(portal()).await;
    let source = LiveSource::new(format!("{base}/unavailable"), Duration::from_secs(5)).unwrap();

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::HttpStatus { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
    ));
}

#[tokio::test]
async fn undecodable_body_is_reported() {
    let base = serve(portal()).await;
    let source = LiveSource::new(format!("{base}/plain"), Duration::from_secs(5)).unwrap();

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::Snapshot(SnapshotError::Decompress(_))
    ));
}

#[tokio::test]
async fn slow_response_times_out() {
    let base = serve(portal()).await;
    let source = LiveSource::new(format!("{base}/slow"), Duration::from_millis(200)).unwrap();

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::Timeout { timeout, .. } if timeout == Duration::from_millis(200)
    ));
}

#[tokio::test]
async fn fetched_payload_is_persisted_to_archive() {
    let base = serve(portal()).await;
    let archive = SnapshotArchive::in_memory(Duration::from_secs(5));
    let source = LiveSource::new(format!("{base}/demo_r_mwk_05.tsv.gz"), Duration::from_secs(5))
        .unwrap()
        .with_persistence(archive.clone());

    let snapshot = source.fetch().await.unwrap();
    let expected_key = snapshot_file_name(snapshot.captured_at());

    let mut keys = Vec::new();
    for _ in 0..50 {
        keys = archive.list_keys().await.unwrap();
        if !keys.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(keys, vec![expected_key.clone()]);

    let restored = archive.latest_snapshot().await.unwrap();
    assert_eq!(restored.len(), snapshot.len());
    assert_eq!(
        restored.captured_at().timestamp(),
        snapshot.captured_at().timestamp()
    );
}

#[tokio::test]
async fn failed_fetch_persists_nothing() {
    let base = serve(portal()).await;
    let archive = SnapshotArchive::in_memory(Duration::from_secs(5));
    let source = LiveSource::new(format!("{base}/plain"), Duration::from_secs(5))
        .unwrap()
        .with_persistence(archive.clone());

    assert!(source.fetch().await.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(archive.list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn chain_falls_back_to_archive_when_live_fails() {
    let base = serve(portal()).await;
    let archive = SnapshotArchive::in_memory(Duration::from_secs(5));

    let seed = LiveSource::new(format!("{base}/demo_r_mwk_05.tsv.gz"), Duration::from_secs(5))
        .unwrap()
        .with_persistence(archive.clone());
    seed.fetch().await.unwrap();
    for _ in 0..50 {
        if !archive.list_keys().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let broken = LiveSource::new(format!("{base}/unavailable"), Duration::from_secs(5)).unwrap();
    let chain = SourceChain::new(vec![
        SnapshotSource::Live(broken),
        SnapshotSource::Archive(archive),
    ]);

    let snapshot = chain.fetch().await.unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn chain_reports_archive_error_when_everything_fails() {
    let base = serve(portal()).await;
    let broken = LiveSource::new(format!("{base}/unavailable"), Duration::from_secs(5)).unwrap();
    let chain = SourceChain::new(vec![
        SnapshotSource::Live(broken),
        SnapshotSource::Archive(SnapshotArchive::in_memory(Duration::from_secs(5))),
    ]);

    let err = chain.fetch().await.unwrap_err();
    assert!(matches!(err, SourceError::Archive(ArchiveError::BucketEmpty)));
}
