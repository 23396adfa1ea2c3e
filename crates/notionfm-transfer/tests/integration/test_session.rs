//! UploadSession tests: single-shot, multi-part, retry, and session recovery

use std::sync::Arc;
use std::time::Duration;

use notionfm_core::domain::{BlockCategory, PartLimits, RetryPolicy, TaskStatus};
use notionfm_core::ports::RemoteError;
use notionfm_transfer::planner::ChunkPlanner;
use notionfm_transfer::session::UploadSession;
use notionfm_transfer::TransferError;
use tempfile::TempDir;

use crate::common::*;

const MIB: usize = 1024 * 1024;

async fn session_for(
    remote: &Arc<MockRemote>,
    path: &std::path::Path,
    limits: PartLimits,
) -> UploadSession {
    let (spec, plan) = ChunkPlanner::new(limits).plan(path).await.unwrap();
    UploadSession::new(remote.clone(), spec, plan, page(), fast_options())
}

#[tokio::test]
async fn test_small_file_single_shot_status_sequence() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "report.pdf", 3 * MIB);
    let remote = Arc::new(MockRemote::new());
    let (callback, events) = recorder();

    let mut session = session_for(&remote, &path, PartLimits::default())
        .await
        .with_progress(callback);
    let outcome = session.run().await.unwrap();

    let calls = remote.calls();
    assert_eq!(remote.count(Op::Create), 1);
    assert_eq!(calls[0].declared_parts, None);
    assert_eq!(remote.sent_parts(), vec![("up-1".to_string(), None)]);
    assert_eq!(remote.count(Op::Complete), 0);
    assert_eq!(remote.count(Op::Attach), 1);
    assert_eq!(outcome.bytes_sent, (3 * MIB) as u64);

    let events = events.lock().unwrap();
    assert_eq!(
        status_sequence(&events),
        vec![
            TaskStatus::Pending,
            TaskStatus::Uploading,
            TaskStatus::Completing,
            TaskStatus::Attaching,
            TaskStatus::Completed,
        ]
    );
    assert_eq!(
        events.iter().filter(|e| e.status == TaskStatus::Completed).count(),
        1
    );
    assert_eq!(events.last().unwrap().bytes_confirmed, (3 * MIB) as u64);
}

#[tokio::test]
async fn test_large_file_sends_five_parts_then_attaches() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "movie.mkv", 45 * MIB);
    let remote = Arc::new(MockRemote::new());

    let mut session = session_for(&remote, &path, PartLimits::default()).await;
    let outcome = session.run().await.unwrap();

    let calls = remote.calls();
    assert_eq!(calls[0].op, Op::Create);
    assert_eq!(calls[0].declared_parts, Some(5));
    // mkv is on the allow-list, so no spoofing
    assert_eq!(calls[0].filename.as_deref(), Some("movie.mkv"));

    let parts: Vec<_> = remote.sent_parts().into_iter().map(|(_, p)| p).collect();
    assert_eq!(parts, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);

    let ops: Vec<_> = calls.iter().map(|c| c.op).collect();
    assert_eq!(&ops[ops.len() - 2..], &[Op::Complete, Op::Attach]);

    let attach = calls.last().unwrap();
    assert_eq!(attach.destination.as_deref(), Some("dest-page"));
    assert_eq!(attach.upload_id, outcome.upload_id.as_str());
    assert_eq!(attach.display_name.as_deref(), Some("movie.mkv"));
    assert_eq!(attach.category, Some(BlockCategory::Video));
    assert_eq!(remote.bytes_sent(), (45 * MIB) as u64);
    assert_eq!(session.confirmed_parts().len(), 5);
}

#[tokio::test]
async fn test_spoofed_file_keeps_original_name_as_caption() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "backup.tar.zst", 8);
    let remote = Arc::new(MockRemote::new());

    let mut session = session_for(&remote, &path, tiny_limits()).await;
    session.run().await.unwrap();

    let calls = remote.calls();
    assert_eq!(calls[0].filename.as_deref(), Some("backup.tar.zst.txt"));
    let attach = calls.last().unwrap();
    assert_eq!(attach.display_name.as_deref(), Some("backup.tar.zst"));
    assert_eq!(attach.category, Some(BlockCategory::Generic));
}

#[tokio::test]
async fn test_session_invalid_mid_upload_resumes_on_new_session() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 50);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Send, Some(3), 1, RemoteError::SessionInvalid("expired".into()));
    let (callback, events) = recorder();

    let mut session = session_for(&remote, &path, tiny_limits())
        .await
        .with_progress(callback);
    let outcome = session.run().await.unwrap();

    assert_eq!(remote.count(Op::Create), 2);
    let creates: Vec<_> = remote
        .calls()
        .into_iter()
        .filter(|c| c.op == Op::Create)
        .collect();
    assert_eq!(creates[1].declared_parts, Some(5));

    assert_eq!(
        remote.sent_parts(),
        vec![
            ("up-1".to_string(), Some(1)),
            ("up-1".to_string(), Some(2)),
            ("up-2".to_string(), Some(3)),
            ("up-2".to_string(), Some(4)),
            ("up-2".to_string(), Some(5)),
        ]
    );
    // Each byte exactly once across both sessions
    assert_eq!(remote.bytes_sent(), 50);
    assert_eq!(outcome.upload_id.as_str(), "up-2");
    assert_eq!(outcome.sessions_created, 2);
    assert_eq!(outcome.recoveries, 1);
    assert_eq!(remote.count(Op::Status), 0);

    let seq = status_sequence(&events.lock().unwrap());
    assert!(seq.contains(&TaskStatus::RecoveringSession));
    assert!(!seq.contains(&TaskStatus::CheckingSession));
    assert_eq!(*seq.last().unwrap(), TaskStatus::Completed);
}

#[tokio::test]
async fn test_status_check_keeps_usable_session() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.set_session_status("pending", false);
    remote.fail(Op::Send, Some(2), 1, RemoteError::SessionInvalid("pending".into()));
    let (callback, events) = recorder();

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        check_session_status: true,
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options)
        .with_progress(callback);
    session.run().await.unwrap();

    assert_eq!(remote.count(Op::Create), 1);
    assert_eq!(remote.count(Op::Status), 1);
    let parts: Vec<_> = remote.sent_parts().into_iter().map(|(_, p)| p).collect();
    assert_eq!(parts, vec![Some(1), Some(2), Some(3)]);

    let seq = status_sequence(&events.lock().unwrap());
    let recovering = seq.iter().position(|s| *s == TaskStatus::RecoveringSession).unwrap();
    assert_eq!(seq[recovering + 1], TaskStatus::CheckingSession);
    assert_eq!(seq[recovering + 2], TaskStatus::Uploading);
}

#[tokio::test]
async fn test_kept_session_failing_again_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.set_session_status("pending", false);
    remote.fail(Op::Send, Some(2), 2, RemoteError::SessionInvalid("pending".into()));

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        check_session_status: true,
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options);
    let outcome = session.run().await.unwrap();

    // First failure: checked and kept. Second: replaced without a second check.
    assert_eq!(remote.count(Op::Status), 1);
    assert_eq!(remote.count(Op::Create), 2);
    assert_eq!(outcome.recoveries, 1);
    assert_eq!(remote.bytes_sent(), 30);
}

#[tokio::test]
async fn test_kept_session_does_not_count_toward_recovery_limit() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.set_session_status("pending", false);
    remote.fail(Op::Send, Some(2), 2, RemoteError::SessionInvalid("pending".into()));

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        check_session_status: true,
        max_session_recoveries: Some(1),
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options);
    let outcome = session.run().await.unwrap();

    assert_eq!(outcome.recoveries, 1);
    assert_eq!(outcome.upload_id.as_str(), "up-2");
    assert_eq!(remote.count(Op::Status), 1);
}

#[tokio::test]
async fn test_refused_session_creation_is_recovered() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Create, None, 1, RemoteError::SessionInvalid("expired".into()));
    let (callback, events) = recorder();

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        check_session_status: true,
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options)
        .with_progress(callback);
    let outcome = session.run().await.unwrap();

    assert_eq!(remote.count(Op::Create), 2);
    // No session existed, so there is nothing to check
    assert_eq!(remote.count(Op::Status), 0);
    assert_eq!(outcome.upload_id.as_str(), "up-2");
    assert_eq!(outcome.recoveries, 1);
    assert_eq!(remote.bytes_sent(), 30);
    assert!(status_sequence(&events.lock().unwrap()).contains(&TaskStatus::RecoveringSession));
}

#[tokio::test]
async fn test_refused_session_creation_respects_recovery_limit() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Create, None, 5, RemoteError::SessionInvalid("expired".into()));

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        max_session_recoveries: Some(2),
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options);
    let err = session.run().await.unwrap_err();

    assert!(matches!(err, TransferError::RecoveryLimit(2)));
    assert_eq!(remote.count(Op::Create), 3);
    assert_eq!(remote.count(Op::Send), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retry_with_capped_backoff() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Send, Some(2), 4, RemoteError::Transient("503".into()));

    let mut session = session_for(&remote, &path, tiny_limits()).await;
    let outcome = session.run().await.unwrap();

    let attempts: Vec<_> = remote
        .calls()
        .into_iter()
        .filter(|c| c.op == Op::Send && c.part == Some(2))
        .collect();
    // K failures, K + 1 attempts
    assert_eq!(attempts.len(), 5);
    assert!(attempts.last().unwrap().ok);
    assert_eq!(outcome.retries, 4);

    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1].at - w[0].at).collect();
    for pair in gaps.windows(2) {
        assert!(pair[1] >= pair[0], "delays must not decrease: {gaps:?}");
    }
    assert!(gaps[0] >= Duration::from_millis(10));
    assert!(gaps.iter().all(|g| *g <= Duration::from_millis(45)), "{gaps:?}");
}

#[tokio::test(start_paused = true)]
async fn test_attempt_ceiling_fails_the_upload() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 5);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Send, None, 10, RemoteError::Transient("timeout".into()));
    let (callback, events) = recorder();

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        retry: RetryPolicy::bounded(3, Duration::from_millis(10), Duration::from_millis(40)),
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options)
        .with_progress(callback);
    let err = session.run().await.unwrap_err();

    assert!(matches!(
        err,
        TransferError::RetriesExhausted { step: "send part", attempts: 3, .. }
    ));
    assert_eq!(remote.count(Op::Send), 3);
    assert_eq!(session.status(), TaskStatus::Failed);
    assert_eq!(events.lock().unwrap().last().unwrap().status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_api_error_fails_without_retry() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 5);
    let remote = Arc::new(MockRemote::new());
    remote.fail(
        Op::Create,
        None,
        1,
        RemoteError::Api {
            status: 400,
            message: "validation_error: bad content type".into(),
        },
    );

    let mut session = session_for(&remote, &path, tiny_limits()).await;
    let err = session.run().await.unwrap_err();

    assert!(matches!(err, TransferError::Remote(RemoteError::Api { status: 400, .. })));
    assert_eq!(remote.count(Op::Create), 1);
    assert_eq!(remote.count(Op::Send), 0);
    assert_eq!(session.status(), TaskStatus::Failed);
}

#[tokio::test]
async fn test_session_lost_at_complete_restarts_from_scratch() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Complete, None, 1, RemoteError::SessionInvalid("expired".into()));

    let mut session = session_for(&remote, &path, tiny_limits()).await;
    let outcome = session.run().await.unwrap();

    assert_eq!(remote.count(Op::Create), 2);
    assert_eq!(
        remote.sent_parts(),
        vec![
            ("up-1".to_string(), Some(1)),
            ("up-1".to_string(), Some(2)),
            ("up-1".to_string(), Some(3)),
            ("up-2".to_string(), Some(1)),
            ("up-2".to_string(), Some(2)),
            ("up-2".to_string(), Some(3)),
        ]
    );
    assert_eq!(outcome.upload_id.as_str(), "up-2");
    assert_eq!(outcome.bytes_sent, 60);
    assert_eq!(remote.calls().last().unwrap().upload_id, "up-2");
}

#[tokio::test]
async fn test_recovery_limit_fails_the_upload() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());
    remote.fail(Op::Send, None, 5, RemoteError::SessionInvalid("gone".into()));

    let (spec, plan) = ChunkPlanner::new(tiny_limits()).plan(&path).await.unwrap();
    let options = notionfm_transfer::session::SessionOptions {
        max_session_recoveries: Some(1),
        ..fast_options()
    };
    let mut session = UploadSession::new(remote.clone(), spec, plan, page(), options);
    let err = session.run().await.unwrap_err();

    assert!(matches!(err, TransferError::RecoveryLimit(1)));
    assert_eq!(remote.count(Op::Create), 2);
}

#[tokio::test]
async fn test_file_truncated_after_planning_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.pdf", 30);
    let remote = Arc::new(MockRemote::new());

    let mut session = session_for(&remote, &path, tiny_limits()).await;
    std::fs::write(&path, b"short").unwrap();
    let err = session.run().await.unwrap_err();

    assert!(matches!(
        err,
        TransferError::FileChanged { expected: 30, actual: 5, .. }
    ));
    assert_eq!(remote.count(Op::Send), 0);
}

#[tokio::test]
async fn test_finished_session_cannot_run_again() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "a.png", 5);
    let remote = Arc::new(MockRemote::new());

    let mut session = session_for(&remote, &path, tiny_limits()).await;
    session.run().await.unwrap();
    let err = session.run().await.unwrap_err();

    assert!(matches!(err, TransferError::Domain(_)));
    assert_eq!(session.status(), TaskStatus::Completed);
    assert_eq!(remote.count(Op::Create), 1);
}
