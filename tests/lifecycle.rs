//! Coordinator-level lifecycle scenarios: retention, invalidation, sweep
//! behavior, and error-path cleanup, exercised with a counting stub backend
//! and generated PDFs.

mod common;

use chrono::{Duration, Utc};

use common::{context, make_pdf, StubBackend};
use docdrop::error::DocdropError;
use docdrop::sweeper::sweep_once;

#[tokio::test]
async fn query_success_schedules_delayed_eviction() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("a.pdf", &make_pdf("Rust is a systems programming language."))
        .await
        .unwrap();

    let answer = ctx.query("s1", "What is Rust?").await.unwrap();
    assert_eq!(answer.answer, "answer to: What is Rust?");
    assert_eq!(answer.session_id, "s1");
    assert_eq!(answer.question, "What is Rust?");
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.sources[0].source, "a.pdf");

    // The index survives the response but is due within its ttl window.
    assert!(ctx.registry.get("s1").is_some());
    let due = ctx
        .registry
        .due_for_eviction(Utc::now() + Duration::seconds(61));
    assert_eq!(due, vec!["s1".to_string()]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn upload_invalidation_beats_the_eviction_timer() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("a.pdf", &make_pdf("First document."))
        .await
        .unwrap();
    ctx.query("s1", "Q").await.unwrap();
    assert!(ctx.registry.get("s1").is_some());

    // New upload invalidates the index long before its 60s window elapses.
    ctx.upload("b.pdf", &make_pdf("Second document."))
        .await
        .unwrap();
    assert!(ctx.registry.get("s1").is_none());

    ctx.shutdown().await;
}

#[tokio::test]
async fn concurrent_queries_share_one_build() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("a.pdf", &make_pdf("Shared corpus text."))
        .await
        .unwrap();

    let (r1, r2) = tokio::join!(ctx.query("s1", "first?"), ctx.query("s1", "second?"));
    r1.unwrap();
    r2.unwrap();

    // One chunk-embedding call for the shared build, plus one per question.
    assert_eq!(backend.embed_calls(), 3);

    ctx.shutdown().await;
}

#[tokio::test]
async fn failed_build_leaves_no_session_state() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::failing_embed());

    ctx.upload("a.pdf", &make_pdf("Some text.")).await.unwrap();

    let err = ctx.query("s1", "Q").await.unwrap_err();
    assert!(matches!(err, DocdropError::Build(_)));
    assert!(ctx.registry.get("s1").is_none());
    assert_eq!(ctx.registry.active_sessions(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn failed_answer_evicts_the_built_index() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::failing_answer());

    ctx.upload("a.pdf", &make_pdf("Some text.")).await.unwrap();

    let err = ctx.query("s1", "Q").await.unwrap_err();
    assert!(matches!(err, DocdropError::Upstream(_)));
    // The index was built, then evicted on the error path.
    assert!(ctx.registry.get("s1").is_none());

    ctx.shutdown().await;
}

#[tokio::test]
async fn query_skips_unreadable_files() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("good.pdf", &make_pdf("Readable content."))
        .await
        .unwrap();
    ctx.upload("bad.pdf", b"not a pdf at all").await.unwrap();

    let answer = ctx.query("s1", "Q").await.unwrap();
    assert!(answer.sources.iter().all(|s| s.source == "good.pdf"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn query_with_only_unreadable_files_is_validation_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("bad.pdf", b"not a pdf at all").await.unwrap();

    let err = ctx.query("s1", "Q").await.unwrap_err();
    assert!(matches!(err, DocdropError::Validation(_)));
    assert_eq!(ctx.registry.active_sessions(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn sweep_reclaims_expired_file_and_its_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("a.pdf", &make_pdf("Expiring document."))
        .await
        .unwrap();
    let path = tmp.path().join("docs/a.pdf");
    assert!(path.exists());

    let now = Utc::now();
    assert!(ctx
        .ledger
        .time_remaining("a.pdf", now)
        .is_some_and(|d| d.num_minutes() >= 9));

    // Nothing expires just before the 10-minute mark.
    let early = sweep_once(
        &ctx.ledger,
        &ctx.registry,
        &ctx.config.storage.upload_dir,
        now + Duration::seconds(599),
    );
    assert_eq!(early.files_evicted, 0);
    assert!(path.exists());

    // Past the ttl the file and its entry are gone.
    let late = sweep_once(
        &ctx.ledger,
        &ctx.registry,
        &ctx.config.storage.upload_dir,
        now + Duration::seconds(601),
    );
    assert_eq!(late.files_evicted, 1);
    assert!(!path.exists());
    assert!(ctx.ledger.is_empty());

    ctx.shutdown().await;
}

#[tokio::test]
async fn shutdown_evicts_remaining_sessions() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("a.pdf", &make_pdf("Some text.")).await.unwrap();
    ctx.query("s1", "Q").await.unwrap();
    assert_eq!(ctx.registry.active_sessions(), 1);

    ctx.shutdown().await;
    assert_eq!(ctx.registry.active_sessions(), 0);
}

#[tokio::test]
async fn delete_leaves_other_sessions_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    ctx.upload("a.pdf", &make_pdf("First.")).await.unwrap();
    ctx.upload("b.pdf", &make_pdf("Second.")).await.unwrap();
    ctx.query("s1", "Q").await.unwrap();

    // Deleting a single file does not invalidate live indexes; they age out
    // within their own short ttl.
    assert!(ctx.delete("b.pdf").await.unwrap());
    assert!(ctx.registry.get("s1").is_some());

    ctx.shutdown().await;
}

#[tokio::test]
async fn reupload_replaces_the_ledger_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctx, _backend) = context(tmp.path(), StubBackend::new());

    let first = ctx.upload("a.pdf", &make_pdf("v1")).await.unwrap();
    let second = ctx.upload("a.pdf", &make_pdf("version two")).await.unwrap();

    assert_eq!(ctx.ledger.len(), 1);
    assert!(second.acquired_at >= first.acquired_at);
    assert_ne!(second.size, first.size);

    ctx.shutdown().await;
}
