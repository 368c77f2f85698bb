//! Integration tests for the package install guard rails.
//!
//! The success path needs the installer on PATH plus network access,
//! so it is not exercised here; the guards must hold regardless.

mod common;

use common::TestContext;
use replbox::ReplboxError;

fn names(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn injection_attempts_are_rejected_before_any_spawn() {
    let Some(ctx) = TestContext::new() else { return };

    let box_id = ctx.service.create_session().await.unwrap();

    for bad in ["numpy; rm -rf /", "numpy && true", "pkg$(id)", "a b"] {
        let err = ctx
            .service
            .install_packages(box_id.as_str(), &names(&["numpy", bad]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ReplboxError::InvalidRequest(_)),
            "expected rejection of {bad:?}, got {err:?}"
        );
    }

    ctx.service.destroy(box_id.as_str()).await.unwrap();
}

#[tokio::test]
async fn empty_package_list_is_invalid() {
    let Some(ctx) = TestContext::new() else { return };

    let box_id = ctx.service.create_session().await.unwrap();
    let err = ctx
        .service
        .install_packages(box_id.as_str(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ReplboxError::InvalidRequest(_)));

    ctx.service.destroy(box_id.as_str()).await.unwrap();
}

#[tokio::test]
async fn install_into_unknown_box_is_not_found() {
    let Some(ctx) = TestContext::new() else { return };

    let err = ctx
        .service
        .install_packages("no-such-box", &names(&["numpy"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ReplboxError::NotFound(_)));
}
