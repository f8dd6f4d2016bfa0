use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::StatusCode, response::IntoResponse, routing::get, Router};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use tokio_util::sync::CancellationToken;

use prometheus_mcp::fetch::HttpArchiveFetcher;
use prometheus_mcp::metrics::Metrics;
use prometheus_mcp::remote::RefLister;
use prometheus_mcp::updater::{DocsUpdater, UpdateOutcome, UpdaterSettings};
use prometheus_mcp_core::{
    DocsError, DocsSnapshot, DocsState, ExtractConfig, ExtractedFile, PublishedDocs, UpdateStage,
};

struct MockRefLister {
    refs: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockRefLister {
    fn main_at(commit: &str) -> Arc<Self> {
        let mut refs = HashMap::new();
        refs.insert("refs/heads/main".to_string(), commit.to_string());
        refs.insert("HEAD".to_string(), commit.to_string());
        Arc::new(Self {
            refs,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RefLister for MockRefLister {
    async fn list_refs(&self, _cancel: &CancellationToken) -> Result<HashMap<String, String>, DocsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.refs.clone())
    }
}

fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn def456_archive() -> Vec<u8> {
    archive(&[
        ("docs-def456/docs/intro.md", b"# Intro\nhi"),
        ("docs-def456/docs/logo.png", b"\x89PNG"),
        ("docs-def456/LICENSE", b"Apache License"),
    ])
}

struct ArchiveServer {
    url: String,
    hits: Arc<AtomicUsize>,
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/archive.tar.gz", addr)
}

async fn archive_server(status: StatusCode, body: Vec<u8>, delay: Duration) -> ArchiveServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/archive.tar.gz",
        get(move || {
            let counter = counter.clone();
            let body = body.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                (status, body)
            }
        }),
    );
    ArchiveServer {
        url: serve(app).await,
        hits,
    }
}

fn initial_state() -> Arc<DocsState> {
    let tree = std::iter::once(ExtractedFile {
        path: "old.md".to_string(),
        data: b"# Old".to_vec(),
    })
    .collect();
    let snapshot = DocsSnapshot::build(tree).unwrap();
    Arc::new(DocsState::new(PublishedDocs::new(snapshot, "abc123")))
}

struct Harness {
    updater: Arc<DocsUpdater>,
    state: Arc<DocsState>,
    metrics: Metrics,
}

fn harness(refs: Arc<MockRefLister>, url: &str, extract: ExtractConfig, max_archive_bytes: u64) -> Harness {
    harness_with_timeout(refs, url, extract, max_archive_bytes, Duration::from_secs(5))
}

fn harness_with_timeout(
    refs: Arc<MockRefLister>,
    url: &str,
    extract: ExtractConfig,
    max_archive_bytes: u64,
    timeout: Duration,
) -> Harness {
    let state = initial_state();
    let metrics = Metrics::new().unwrap();
    let fetcher = HttpArchiveFetcher::new(timeout, max_archive_bytes).unwrap();
    let settings = UpdaterSettings {
        archive_url: url.to_string(),
        branch: "main".to_string(),
        extract,
        http_timeout: timeout,
    };
    let updater = DocsUpdater::new(
        state.clone(),
        refs,
        Arc::new(fetcher),
        settings,
        metrics.docs.clone(),
    );
    Harness {
        updater: Arc::new(updater),
        state,
        metrics,
    }
}

#[tokio::test]
async fn unchanged_commit_skips_download() {
    let server = archive_server(StatusCode::OK, def456_archive(), Duration::ZERO).await;
    let refs = MockRefLister::main_at("abc123");
    let h = harness(refs.clone(), &server.url, ExtractConfig::default(), 1 << 20);

    let outcome = h.updater.update(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::UpToDate {
            commit: "abc123".to_string()
        }
    );
    assert_eq!(refs.calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.state.snapshot().file_names().collect::<Vec<_>>(), vec!["old.md"]);
    assert!(h.state.current().published_at.is_none());
    assert_eq!(h.metrics.docs.last_update_timestamp.get(), 0.0);
    assert_eq!(h.metrics.docs.update_failures.get(), 0);
}

#[tokio::test]
async fn repeated_update_is_idempotent() {
    let server = archive_server(StatusCode::OK, def456_archive(), Duration::ZERO).await;
    let refs = MockRefLister::main_at("def456");
    let h = harness(refs.clone(), &server.url, ExtractConfig::default(), 1 << 20);
    let cancel = CancellationToken::new();

    let first = h.updater.update(&cancel).await.unwrap();
    assert!(matches!(first, UpdateOutcome::Updated { files: 1, .. }));
    let published = h.state.current();

    let second = h.updater.update(&cancel).await.unwrap();

    assert_eq!(
        second,
        UpdateOutcome::UpToDate {
            commit: "def456".to_string()
        }
    );
    assert_eq!(refs.calls.load(Ordering::SeqCst), 2);
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&published, &h.state.current()));
}

#[tokio::test]
async fn new_commit_publishes_docs_subtree() {
    let server = archive_server(StatusCode::OK, def456_archive(), Duration::ZERO).await;
    let h = harness(
        MockRefLister::main_at("def456"),
        &server.url,
        ExtractConfig::default(),
        1 << 20,
    );

    let outcome = h.updater.update(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            old_commit: "abc123".to_string(),
            new_commit: "def456".to_string(),
            files: 1,
        }
    );
    let current = h.state.current();
    assert_eq!(current.commit, "def456");
    assert!(current.published_at.is_some());
    assert_eq!(current.snapshot.file_names().collect::<Vec<_>>(), vec!["intro.md"]);
    assert_eq!(current.snapshot.file("intro.md"), Some("# Intro\nhi"));
    assert_eq!(current.snapshot.total_bytes(), 10);
    assert!(h.metrics.docs.last_update_timestamp.get() > 0.0);
    assert_eq!(h.metrics.docs.update_failures.get(), 0);
}

#[tokio::test]
async fn download_error_keeps_previous_state() {
    let server = archive_server(
        StatusCode::SERVICE_UNAVAILABLE,
        b"try later".to_vec(),
        Duration::ZERO,
    )
    .await;
    let h = harness(
        MockRefLister::main_at("def456"),
        &server.url,
        ExtractConfig::default(),
        1 << 20,
    );

    let err = h.updater.update(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, UpdateStage::Downloading);
    match &err.source {
        DocsError::Download { status, message } => {
            assert_eq!(*status, Some(503));
            assert_eq!(message, "try later");
        }
        other => panic!("expected Download, got {other:?}"),
    }
    assert_eq!(h.state.commit(), "abc123");
    assert!(h.state.snapshot().file("old.md").is_some());
    assert_eq!(h.metrics.docs.update_failures.get(), 1);
}

#[tokio::test]
async fn missing_branch_is_an_error() {
    let server = archive_server(StatusCode::OK, def456_archive(), Duration::ZERO).await;
    let refs = Arc::new(MockRefLister {
        refs: HashMap::from([("refs/heads/other".to_string(), "def456".to_string())]),
        calls: AtomicUsize::new(0),
    });
    let h = harness(refs, &server.url, ExtractConfig::default(), 1 << 20);

    let err = h.updater.update(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, UpdateStage::CheckingRemote);
    assert!(matches!(err.source, DocsError::RefNotFound { .. }));
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.docs.update_failures.get(), 1);
}

#[tokio::test]
async fn concurrent_updates_download_once() {
    let server = archive_server(
        StatusCode::OK,
        def456_archive(),
        Duration::from_millis(100),
    )
    .await;
    let refs = MockRefLister::main_at("def456");
    let h = harness(refs.clone(), &server.url, ExtractConfig::default(), 1 << 20);

    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(h.updater.update(&cancel), h.updater.update(&cancel));
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, UpdateOutcome::Updated { .. }));

    assert_eq!(
        outcomes[0],
        UpdateOutcome::UpToDate {
            commit: "def456".to_string()
        }
    );
    assert!(matches!(outcomes[1], UpdateOutcome::Updated { files: 1, .. }));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert_eq!(refs.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.state.commit(), "def456");
}

#[tokio::test]
async fn cancellation_leaves_state_untouched() {
    let server = archive_server(StatusCode::OK, def456_archive(), Duration::from_secs(30)).await;
    let h = harness(
        MockRefLister::main_at("def456"),
        &server.url,
        ExtractConfig::default(),
        1 << 20,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), h.updater.update(&cancel))
        .await
        .expect("update did not observe cancellation")
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(h.state.commit(), "abc123");
    assert_eq!(h.metrics.docs.update_failures.get(), 1);
}

#[tokio::test]
async fn stalled_body_hits_timeout() {
    // Headers and the gzip magic arrive, then the body stalls.
    let app = Router::new().route(
        "/archive.tar.gz",
        get(|| async {
            let head = futures_util::stream::once(async {
                Ok::<_, std::io::Error>(Bytes::from_static(b"\x1f\x8b"))
            });
            let stall = futures_util::stream::once(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, std::io::Error>(Bytes::new())
            });
            Body::from_stream(futures_util::StreamExt::chain(head, stall)).into_response()
        }),
    );
    let url = serve(app).await;
    let h = harness_with_timeout(
        MockRefLister::main_at("def456"),
        &url,
        ExtractConfig::default(),
        1 << 20,
        Duration::from_secs(1),
    );

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        h.updater.update(&CancellationToken::new()),
    )
    .await
    .expect("update ignored its timeout")
    .unwrap_err();

    assert_eq!(err.stage, UpdateStage::Downloading);
    match &err.source {
        DocsError::Download { message, .. } => assert!(message.contains("timed out"), "{message}"),
        other => panic!("expected Download, got {other:?}"),
    }
    assert_eq!(h.state.commit(), "abc123");
    assert_eq!(h.metrics.docs.update_failures.get(), 1);
}

#[tokio::test]
async fn declared_length_over_limit_is_rejected() {
    let body = def456_archive();
    let limit = (body.len() / 2) as u64;
    let server = archive_server(StatusCode::OK, body, Duration::ZERO).await;
    let h = harness(
        MockRefLister::main_at("def456"),
        &server.url,
        ExtractConfig::default(),
        limit,
    );

    let err = h.updater.update(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err.source, DocsError::SizeLimitExceeded(_)), "{err}");
    assert_eq!(h.state.commit(), "abc123");
}

#[tokio::test]
async fn streamed_body_over_limit_is_aborted() {
    let body = def456_archive();
    let limit = (body.len() / 2) as u64;
    let chunks: Vec<Bytes> = body.chunks(16).map(Bytes::copy_from_slice).collect();
    // No Content-Length: the body is sent chunked.
    let app = Router::new().route(
        "/archive.tar.gz",
        get(move || {
            let items: Vec<Result<Bytes, std::io::Error>> = chunks.iter().cloned().map(Ok).collect();
            async move { Body::from_stream(futures_util::stream::iter(items)).into_response() }
        }),
    );
    let url = serve(app).await;
    let h = harness(
        MockRefLister::main_at("def456"),
        &url,
        ExtractConfig::default(),
        limit,
    );

    let err = h.updater.update(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err.source, DocsError::SizeLimitExceeded(_)), "{err}");
    assert_eq!(h.state.commit(), "abc123");
    assert_eq!(h.metrics.docs.update_failures.get(), 1);
}

#[tokio::test]
async fn decompressed_limit_aborts_extraction() {
    let server = archive_server(StatusCode::OK, def456_archive(), Duration::ZERO).await;
    let extract = ExtractConfig {
        max_decompressed_bytes: 5,
        ..ExtractConfig::default()
    };
    let h = harness(MockRefLister::main_at("def456"), &server.url, extract, 1 << 20);

    let err = h.updater.update(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, UpdateStage::Extracting);
    match &err.source {
        DocsError::SizeLimitExceeded(msg) => assert!(msg.contains("intro.md"), "{msg}"),
        other => panic!("expected SizeLimitExceeded, got {other:?}"),
    }
    assert_eq!(h.state.commit(), "abc123");
}

#[tokio::test]
async fn archive_without_docs_is_rejected() {
    let body = archive(&[("repo-def456/README.md", b"# Readme")]);
    let server = archive_server(StatusCode::OK, body, Duration::ZERO).await;
    let h = harness(
        MockRefLister::main_at("def456"),
        &server.url,
        ExtractConfig::default(),
        1 << 20,
    );

    let err = h.updater.update(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err.source, DocsError::EmptyArchive));
    assert_eq!(h.state.commit(), "abc123");
}
