//! Integration tests for hibernate/restore framing.
//!
//! Without the checkpoint launcher these cover the runtime's side of
//! the contract: artifact persistence, registry lifecycle, and
//! filesystem state surviving the round trip.

mod common;

use common::TestContext;
use replbox::ReplboxError;

#[tokio::test]
async fn snapshot_stops_and_deregisters_the_box() {
    let Some(ctx) = TestContext::new() else { return };

    let box_id = ctx.service.create_session().await.unwrap();
    let snapshot_id = ctx.service.snapshot(box_id.as_str()).await.unwrap();

    // The box left the registry with its artifacts persisted.
    let err = ctx.service.exec_code(box_id.as_str(), "pass").await.unwrap_err();
    assert!(matches!(err, ReplboxError::NotFound(_)));
    assert!(ctx.root().join("snapshots").join(snapshot_id.as_str()).is_dir());
}

#[tokio::test]
async fn files_written_in_a_session_survive_the_round_trip() {
    let Some(ctx) = TestContext::new() else { return };

    let box_id = ctx.service.create_session().await.unwrap();
    ctx.service
        .exec_code(box_id.as_str(), "open('state.txt', 'w').write('persisted')")
        .await
        .unwrap();

    let snapshot_id = ctx.service.snapshot(box_id.as_str()).await.unwrap();
    ctx.service.restore(&box_id, &snapshot_id).await.unwrap();

    let (stdout, stderr) = ctx
        .service
        .exec_code(box_id.as_str(), "print(open('state.txt').read())")
        .await
        .unwrap();
    assert_eq!(stderr, "");
    assert_eq!(stdout.trim(), "persisted");

    ctx.service.destroy(box_id.as_str()).await.unwrap();
}

#[tokio::test]
async fn restore_over_a_live_box_is_rejected() {
    let Some(ctx) = TestContext::new() else { return };

    let box_id = ctx.service.create_session().await.unwrap();
    ctx.service
        .exec_code(box_id.as_str(), "open('keep.txt', 'w').write('x')")
        .await
        .unwrap();
    let snapshot_id = ctx.service.snapshot(box_id.as_str()).await.unwrap();

    // Bring it back once...
    ctx.service.restore(&box_id, &snapshot_id).await.unwrap();

    // ...and a second restore while it is live must be refused.
    let err = ctx
        .service
        .restore(&box_id, &snapshot_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReplboxError::InvalidRequest(_)), "got {err:?}");

    ctx.service.destroy(box_id.as_str()).await.unwrap();
}

#[tokio::test]
async fn destroy_removes_box_addressed_snapshot_scratch() {
    let Some(ctx) = TestContext::new() else { return };

    let box_id = ctx.service.create_session().await.unwrap();

    // Simulate checkpoint scratch addressed by box id.
    let scratch = ctx.root().join("snapshots").join(box_id.as_str());
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("ckpt.img"), b"artifact").unwrap();

    ctx.service.destroy(box_id.as_str()).await.unwrap();
    assert!(!scratch.exists());
}
