#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::error::Error as _;
use std::time::Duration;
use tessera_core::*;

// ---------------------------------------------------------------------------
// 1. Error classification for HTTP mapping
// ---------------------------------------------------------------------------

#[test]
fn not_found_maps_to_its_own_class() {
    let err = SessionError::from_store("load_session", StoreError::NotFound);
    assert!(err.is_not_found());
    assert!(!err.is_bad_input());
    assert!(!err.is_transient());
}

#[test]
fn caller_input_errors_are_bad_input() {
    let errors = [
        SessionError::from(FormatError::WrongLength {
            expected: 52,
            actual: 3,
        }),
        SessionError::Parse {
            operation: "add_attributes",
            source: ParseError::OddArgumentCount { count: 3 },
        },
        SessionError::EmptyAttributes {
            operation: "remove_attributes",
            action: "remove",
        },
    ];
    for err in errors {
        assert!(err.is_bad_input(), "{err}");
        assert!(!err.is_transient(), "{err}");
    }
}

#[test]
fn backend_and_cancellation_are_transient() {
    let errors = [
        StoreError::backend("save", std::io::Error::other("disk full")),
        StoreError::Cancelled { operation: "save" },
        StoreError::DeadlineExceeded { operation: "save" },
    ];
    for source in errors {
        let err = SessionError::from_store("create_user_session", source);
        assert!(err.is_transient(), "{err}");
        assert!(err.to_string().starts_with("create_user_session store error"));
    }
}

#[test]
fn cause_chain_reaches_backend_error() {
    let err = SessionError::from_store(
        "invalidate_session",
        StoreError::backend("invalidate", std::io::Error::other("connection reset")),
    );

    let store = err.source().unwrap();
    assert_eq!(store.to_string(), "invalidate failed: connection reset");
    assert_eq!(store.source().unwrap().to_string(), "connection reset");
}

// ---------------------------------------------------------------------------
// 2. Request context propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn child_context_inherits_parent_cancellation() {
    let parent = RequestContext::new().with_request_id("rq-parent");
    let child = parent.child().with_timeout(Duration::from_secs(60));

    assert_eq!(child.request_id(), Some("rq-parent"));
    parent.cancel();

    let err = child
        .run("load", async { Ok::<_, StoreError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled { operation: "load" }));
}

#[tokio::test]
async fn cancelling_child_leaves_parent_usable() {
    let parent = RequestContext::new();
    let child = parent.child();
    child.cancel();

    assert!(!parent.is_cancelled());
    let out = parent.run("load", async { Ok::<_, StoreError>(1) }).await;
    assert_eq!(out.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_fails_fast() {
    let ctx = RequestContext::new().with_timeout(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(ctx.is_expired());
    assert!(matches!(
        ctx.check("update"),
        Err(StoreError::DeadlineExceeded { operation: "update" })
    ));
}
