use super::*;
use crate::testing::{engine, wait_for, wait_idle, Fault, TestEngine};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

const SESSION: &str = "session-a";

fn setup(seconds: Option<usize>, fault: Fault, max_workers: usize, max_queued: usize) -> TestEngine {
    engine(seconds, fault, max_workers, max_queued)
}

fn by_session() -> TaskLookup<'static> {
    TaskLookup {
        session: Some(SESSION),
        task_id: None,
    }
}

fn by_id(task_id: &str) -> TaskLookup<'_> {
    TaskLookup {
        session: None,
        task_id: Some(task_id),
    }
}

async fn workspace_path(manager: &TaskManager, task_id: &str) -> PathBuf {
    manager.registry().get(task_id).await.unwrap().workspace().path().to_path_buf()
}

#[tokio::test]
async fn test_complete_task_lifecycle() {
    let env = setup(Some(95), Fault::None, 2, 4);
    let task_id = env.manager.start(SESSION, Some("https://valid"), Some("tiny")).await.unwrap();
    assert!(task_id.starts_with("task-"));
    assert_eq!(env.manager.sessions().current(SESSION).await.as_deref(), Some(task_id.as_str()));
    let workspace = workspace_path(&env.manager, &task_id).await;

    env.gate.add_permits(1);
    let snapshot = wait_for(&env.manager, &task_id, |s| s.chunk_index == 1).await;
    assert_eq!(snapshot.state, TaskState::Transcribing);
    assert_eq!(snapshot.chunk_total, 4);
    assert_eq!(snapshot.progress_message, "Transcribing part 2 of 4...");

    let polled = env.manager.progress(by_session()).await.unwrap();
    assert!(!polled.finished);
    assert!(polled.result.is_none());

    env.gate.add_permits(3);
    wait_for(&env.manager, &task_id, |s| s.finished).await;

    let done = env.manager.progress(by_session()).await.unwrap();
    assert_eq!(done.state, TaskState::Completed);
    assert!(done.finished);
    assert_eq!(done.result.as_deref(), Some("part1 part2 part3 part4"));
    assert!(done.error.is_none());
    assert_eq!(done.chunk_index, 4);
    assert!(!workspace.exists());

    // visible exactly once
    assert_eq!(env.manager.progress(by_session()).await.unwrap_err(), TaskError::NoActiveTask);
    assert!(env.manager.registry().is_empty().await);
    assert_eq!(env.manager.sessions().current(SESSION).await, None);
}

#[tokio::test]
async fn test_states_never_move_backward() {
    let env = setup(Some(95), Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    let handle = env.manager.registry().get(&task_id).await.unwrap();
    assert_eq!(handle.config.model_size, ModelSize::Base);

    let mut seen = vec![handle.snapshot().await];
    seen.push(wait_for(&env.manager, &task_id, |s| s.state == TaskState::Transcribing).await);
    for i in 1..4 {
        env.gate.add_permits(1);
        seen.push(wait_for(&env.manager, &task_id, |s| s.chunk_index == i).await);
        seen.push(handle.snapshot().await);
    }
    env.gate.add_permits(1);
    seen.push(wait_for(&env.manager, &task_id, |s| s.finished).await);

    for pair in seen.windows(2) {
        assert!(pair[0].state <= pair[1].state);
        if pair[0].state == TaskState::Transcribing && pair[1].state == TaskState::Transcribing {
            assert!(pair[1].chunk_index >= pair[0].chunk_index);
            assert!(pair[1].chunk_index - pair[0].chunk_index <= 1);
        }
    }
    for snapshot in &seen {
        assert_eq!(snapshot.finished, snapshot.state.is_terminal());
        assert!(snapshot.chunk_index <= snapshot.chunk_total);
        assert!(!(snapshot.result.is_some() && snapshot.error.is_some()));
    }
}

#[tokio::test]
async fn test_missing_url_creates_nothing() {
    let env = setup(Some(5), Fault::None, 1, 1);

    let err = env.manager.start(SESSION, None, Some("tiny")).await.unwrap_err();
    assert_eq!(err.to_string(), "No video URL provided");
    let err = env.manager.start(SESSION, Some("   "), None).await.unwrap_err();
    assert_eq!(err.to_string(), "No video URL provided");

    assert!(env.manager.registry().is_empty().await);
    assert_eq!(env.manager.sessions().current(SESSION).await, None);
    assert_eq!(env.manager.active_tasks(), 0);
}

#[tokio::test]
async fn test_invalid_model_size_creates_nothing() {
    let env = setup(Some(5), Fault::None, 1, 1);
    let err = env.manager.start(SESSION, Some("https://valid"), Some("huge")).await.unwrap_err();
    assert_eq!(err, TaskError::Validation("Invalid model size".to_string()));
    assert!(env.manager.registry().is_empty().await);
}

#[tokio::test]
async fn test_fetch_failure_stays_until_cleanup() {
    let env = setup(None, Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    let workspace = workspace_path(&env.manager, &task_id).await;
    wait_for(&env.manager, &task_id, |s| s.finished).await;

    let first = env.manager.progress(by_session()).await.unwrap();
    assert_eq!(first.state, TaskState::Failed);
    assert!(first.finished);
    assert!(first.result.is_none());
    assert!(first.error.as_deref().unwrap().starts_with("Failed to download audio:"));
    assert!(!workspace.exists());

    let second = env.manager.progress(by_session()).await.unwrap();
    assert_eq!(first, second);
    assert!(env.manager.registry().get(&task_id).await.is_some());

    assert!(env.manager.cleanup(by_session()).await);
    assert!(env.manager.registry().is_empty().await);
    assert!(!env.manager.cleanup(by_session()).await);
    assert_eq!(env.manager.progress(by_session()).await.unwrap_err(), TaskError::NoActiveTask);
}

#[tokio::test]
async fn test_transcribe_failure_aborts_remaining_chunks() {
    let env = setup(Some(95), Fault::FailAt(2), 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    env.gate.add_permits(4);

    let snapshot = wait_for(&env.manager, &task_id, |s| s.finished).await;
    assert_eq!(snapshot.state, TaskState::Failed);
    assert!(snapshot.result.is_none());
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Transcription failed on part 2 of 4: decoder error")
    );
    assert_eq!(snapshot.chunk_index, 1);
    // chunks 3 and 4 never ran
    assert_eq!(env.gate.available_permits(), 2);
}

#[tokio::test]
async fn test_worker_panic_is_recorded_as_failure() {
    let env = setup(Some(35), Fault::PanicAt(1), 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    let workspace = workspace_path(&env.manager, &task_id).await;
    env.gate.add_permits(2);

    let snapshot = wait_for(&env.manager, &task_id, |s| s.finished).await;
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("Unexpected error during transcription"));
    assert!(!workspace.exists());
    wait_idle(&env.manager).await;
}

#[tokio::test]
async fn test_empty_audio_fails_at_split() {
    let env = setup(Some(0), Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();

    let snapshot = wait_for(&env.manager, &task_id, |s| s.finished).await;
    assert_eq!(snapshot.state, TaskState::Failed);
    assert!(snapshot.error.as_deref().unwrap().starts_with("Failed to split audio:"));
}

#[tokio::test]
async fn test_cancel_stops_running_task() {
    let env = setup(Some(95), Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    wait_for(&env.manager, &task_id, |s| s.state == TaskState::Transcribing).await;

    assert_eq!(env.manager.cancel(by_session()).await.unwrap(), task_id);
    let snapshot = wait_for(&env.manager, &task_id, |s| s.finished).await;
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("Transcription cancelled"));

    // still queryable until cleaned up
    assert!(env.manager.progress(by_id(&task_id)).await.is_ok());
    wait_idle(&env.manager).await;
}

#[tokio::test]
async fn test_cleanup_stops_worker_and_removes_workspace() {
    let env = setup(Some(95), Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    let workspace = workspace_path(&env.manager, &task_id).await;
    let handle = env.manager.registry().get(&task_id).await.unwrap();
    wait_for(&env.manager, &task_id, |s| s.state == TaskState::Transcribing).await;

    assert!(env.manager.cleanup(by_session()).await);
    assert!(env.manager.registry().is_empty().await);
    assert!(!workspace.exists());
    assert_eq!(env.manager.sessions().current(SESSION).await, None);

    wait_idle(&env.manager).await;
    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.error.as_deref(), Some("Transcription cancelled"));
}

#[tokio::test]
async fn test_pool_queues_then_rejects() {
    let env = setup(Some(5), Fault::None, 1, 1);
    let first = env.manager.start("a", Some("https://valid"), None).await.unwrap();
    let second = env.manager.start("b", Some("https://valid"), None).await.unwrap();

    let err = env.manager.start("c", Some("https://valid"), None).await.unwrap_err();
    assert_eq!(err, TaskError::Busy);
    assert_eq!(env.manager.sessions().current("c").await, None);

    wait_for(&env.manager, &first, |s| s.state == TaskState::Transcribing).await;
    let queued = wait_for(&env.manager, &second, |s| s.progress_message.starts_with("Waiting")).await;
    assert_eq!(queued.state, TaskState::Created);

    env.gate.add_permits(2);
    wait_for(&env.manager, &first, |s| s.finished).await;
    wait_for(&env.manager, &second, |s| s.finished).await;
    wait_idle(&env.manager).await;

    assert!(env.manager.start("c", Some("https://valid"), None).await.is_ok());
}

#[tokio::test]
async fn test_rebinding_orphans_previous_task() {
    let env = setup(Some(5), Fault::None, 2, 2);
    let first = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    let second = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(env.manager.sessions().current(SESSION).await.as_deref(), Some(second.as_str()));

    env.gate.add_permits(2);
    wait_for(&env.manager, &first, |s| s.finished).await;

    // the orphan is only reachable by id
    let snapshot = env.manager.progress(by_id(&first)).await.unwrap();
    assert_eq!(snapshot.result.as_deref(), Some("part1"));
    assert!(env.manager.registry().get(&first).await.is_none());
    assert_eq!(env.manager.sessions().current(SESSION).await.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_cleanup_by_id_keeps_binding_to_other_task() {
    let env = setup(Some(5), Fault::None, 2, 2);
    let first = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    let second = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();

    let lookup = TaskLookup {
        session: Some(SESSION),
        task_id: Some(&first),
    };
    assert!(env.manager.cleanup(lookup).await);
    assert!(env.manager.registry().get(&first).await.is_none());
    assert_eq!(env.manager.sessions().current(SESSION).await.as_deref(), Some(second.as_str()));
    assert!(env.manager.progress(by_session()).await.is_ok());

    let lookup = TaskLookup {
        session: Some(SESSION),
        task_id: Some(&second),
    };
    assert!(env.manager.cleanup(lookup).await);
    assert_eq!(env.manager.sessions().current(SESSION).await, None);
    assert!(env.manager.registry().is_empty().await);
}

#[tokio::test]
async fn test_reap_expired_removes_uncollected_tasks() {
    let env = setup(None, Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    wait_for(&env.manager, &task_id, |s| s.finished).await;

    assert_eq!(env.manager.reap_expired(Duration::from_secs(3600)).await, 0);
    assert!(env.manager.registry().get(&task_id).await.is_some());

    sleep(Duration::from_millis(5)).await;
    let scheduler = TaskScheduler::new(env.manager.clone(), Duration::ZERO);
    assert_eq!(scheduler.run_once().await, 1);
    assert!(env.manager.registry().is_empty().await);
    assert_eq!(env.manager.sessions().current(SESSION).await, None);
}

#[tokio::test]
async fn test_reap_skips_running_tasks() {
    let env = setup(Some(5), Fault::None, 1, 1);
    let task_id = env.manager.start(SESSION, Some("https://valid"), None).await.unwrap();
    wait_for(&env.manager, &task_id, |s| s.state == TaskState::Transcribing).await;

    assert_eq!(env.manager.reap_expired(Duration::ZERO).await, 0);
    assert!(env.manager.registry().get(&task_id).await.is_some());
    env.gate.add_permits(1);
}

#[tokio::test]
async fn test_shutdown_cancels_everything() {
    let env = setup(Some(5), Fault::None, 1, 1);
    let running = env.manager.start("a", Some("https://valid"), None).await.unwrap();
    let queued = env.manager.start("b", Some("https://valid"), None).await.unwrap();
    wait_for(&env.manager, &running, |s| s.state == TaskState::Transcribing).await;

    env.manager.shutdown().await;
    for task_id in [&running, &queued] {
        let snapshot = wait_for(&env.manager, task_id, |s| s.finished).await;
        assert_eq!(snapshot.error.as_deref(), Some("Transcription cancelled"));
    }
}
