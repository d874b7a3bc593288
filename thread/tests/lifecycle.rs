//! Launch, join and detach behaviour of the lifecycle manager.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use courier_thread::{ThreadError, ThreadManager, ThreadOutcome, ThreadState};
use courier_types::{StackSize, ThreadConfig};

fn manager() -> ThreadManager {
    ThreadManager::new(ThreadConfig::default().with_stack_size(StackSize::new(128 * 1024).unwrap()))
}

#[derive(Debug, Default)]
struct FakeConnection {
    request: String,
    response: Option<String>,
}

fn echo_handler(con: &mut FakeConnection) {
    con.response = Some(format!("OK {}", con.request));
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn launch_and_join_returns_value() {
    let manager = manager();
    let handle = manager.launch(|| 40 + 2).unwrap();
    assert_eq!(handle.join_with_result().unwrap(), ThreadOutcome::Finished(42));
    assert_eq!(manager.attribute_stats().acquired(), 1);
    assert_eq!(manager.attribute_stats().released(), 1);
    assert_eq!(manager.live_threads(), 0);
}

#[test]
fn threads_are_named_from_prefix() {
    let manager = ThreadManager::new(ThreadConfig::default().with_name_prefix("imap"));
    let handle = manager
        .launch(|| std::thread::current().name().map(str::to_owned))
        .unwrap();
    assert_eq!(handle.name(), "imap-1");
    let name = handle.join_with_result().unwrap().finished().flatten();
    assert_eq!(name.as_deref(), Some("imap-1"));
}

#[test]
fn handler_result_travels_through_context() {
    let manager = manager();
    let con = FakeConnection {
        request: "PING".into(),
        response: None,
    };
    let handle = manager.launch_handler(echo_handler, con).unwrap();
    let con = handle.join_with_result().unwrap().finished().unwrap();
    assert_eq!(con.response.as_deref(), Some("OK PING"));
}

#[test]
fn scoped_launch_borrows_context() {
    let manager = manager();
    let mut con = FakeConnection {
        request: "NOOP".into(),
        response: None,
    };
    manager.scope(|scope| {
        let handle = scope.launch_handler(echo_handler, &mut con).unwrap();
        assert_eq!(handle.join_with_result().unwrap(), ThreadOutcome::Finished(()));
    });
    assert_eq!(con.response.as_deref(), Some("OK NOOP"));
}

#[test]
fn scope_joins_unjoined_handles() {
    let manager = manager();
    let mut cons: Vec<FakeConnection> = (0..4)
        .map(|i| FakeConnection {
            request: format!("R{i}"),
            response: None,
        })
        .collect();
    manager.scope(|scope| {
        for con in &mut cons {
            let _handle = scope.launch_handler(echo_handler, con).unwrap();
        }
    });
    assert!(cons.iter().all(|con| con.response.is_some()));
    assert_eq!(manager.live_threads(), 0);
}

#[test]
fn invalid_name_is_attribute_failure_without_acquisition() {
    let manager = ThreadManager::new(ThreadConfig::default().with_name_prefix("bad\0prefix"));
    let err = manager.launch(|| ()).unwrap_err();
    assert!(matches!(err, ThreadError::AttributeInit { .. }));
    assert!(err.is_launch_failure());
    assert_eq!(manager.attribute_stats().acquired(), 0);
    assert_eq!(manager.live_threads(), 0);
}

#[test]
fn live_limit_rejects_without_leaking_attributes() {
    let manager = ThreadManager::new(ThreadConfig::default().with_max_live(Some(1)));
    let (tx, rx) = mpsc::channel::<()>();
    let first = manager.launch(move || rx.recv().is_ok()).unwrap();

    let err = manager.launch(|| false).unwrap_err();
    assert!(matches!(err, ThreadError::Creation { .. }));
    assert_eq!(err.operation(), "thread_create");
    assert_eq!(manager.attribute_stats().acquired(), 2);
    assert_eq!(manager.attribute_stats().released(), 2);
    assert_eq!(manager.live_threads(), 1);

    tx.send(()).unwrap();
    assert_eq!(first.join_with_result().unwrap(), ThreadOutcome::Finished(true));
    assert_eq!(manager.live_threads(), 0);

    let again = manager.launch(|| true).unwrap();
    assert!(again.join_with_result().unwrap().is_finished());
}

#[test]
fn allocation_failure_attempts_no_creation() {
    let manager = ThreadManager::new(ThreadConfig::default().with_max_tracked(1));
    let (tx, rx) = mpsc::channel::<()>();
    let mut first = manager
        .launch_allocated(move || {
            let _ = rx.recv();
        })
        .unwrap();

    let err = manager.launch_allocated(|| ()).unwrap_err();
    assert!(matches!(err, ThreadError::Allocation { capacity: 1, .. }));
    assert_eq!(manager.attribute_stats().acquired(), 1);
    assert_eq!(manager.live_threads(), 1);
    assert_eq!(manager.tracked_threads(), 1);

    tx.send(()).unwrap();
    first.join().unwrap();
    drop(first);
    assert_eq!(manager.tracked_threads(), 0);
    let mut second = manager.launch_allocated(|| ()).unwrap();
    second.join().unwrap();
}

#[test]
fn creation_failure_releases_tracked_record() {
    let manager = ThreadManager::new(
        ThreadConfig::default()
            .with_max_tracked(2)
            .with_max_live(Some(1)),
    );
    let (tx, rx) = mpsc::channel::<()>();
    let mut first = manager
        .launch_allocated(move || {
            let _ = rx.recv();
        })
        .unwrap();

    let err = manager.launch_allocated(|| ()).unwrap_err();
    assert!(matches!(err, ThreadError::Creation { .. }));
    assert_eq!(manager.tracked_threads(), 1);
    assert_eq!(manager.attribute_stats().outstanding(), 0);

    tx.send(()).unwrap();
    first.join().unwrap();
}

#[test]
fn tracked_second_join_is_rejected() {
    let manager = manager();
    let mut thread = manager.launch_allocated(|| 7).unwrap();
    assert_eq!(thread.join_with_result().unwrap(), ThreadOutcome::Finished(7));
    assert_eq!(thread.state(), ThreadState::Reaped);

    let err = thread.join().unwrap_err();
    assert!(matches!(
        err,
        ThreadError::Join {
            reason: "thread was already joined",
            ..
        }
    ));
    assert!(thread.detach().is_err());
}

#[test]
fn tracked_join_after_detach_is_rejected() {
    let manager = manager();
    let (tx, rx) = mpsc::channel::<u8>();
    let mut thread = manager
        .launch_allocated(move || {
            tx.send(1).unwrap();
        })
        .unwrap();
    thread.detach().unwrap();
    assert_eq!(thread.state(), ThreadState::Detached);

    let err = thread.join().unwrap_err();
    assert!(matches!(
        err,
        ThreadError::Join {
            reason: "thread is detached",
            ..
        }
    ));
    // The detached thread still runs to completion on its own.
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(1));
}

#[test]
fn dropped_handle_detaches_and_thread_completes() {
    let manager = manager();
    let (tx, rx) = mpsc::channel::<&'static str>();
    let handle = manager.launch(move || tx.send("done").unwrap()).unwrap();
    drop(handle);
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok("done"));
    wait_until(|| manager.live_threads() == 0);
}

#[test]
fn state_follows_lifecycle() {
    let manager = manager();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let mut thread = manager
        .launch_allocated(move || {
            started_tx.send(()).unwrap();
            let _ = go_rx.recv();
        })
        .unwrap();

    started_rx.recv().unwrap();
    assert_eq!(thread.state(), ThreadState::Running);
    assert!(!thread.is_finished());

    go_tx.send(()).unwrap();
    wait_until(|| thread.is_finished());
    assert_eq!(thread.state(), ThreadState::Exited);

    thread.join().unwrap();
    assert_eq!(thread.state(), ThreadState::Reaped);
}

#[test]
fn handler_panic_is_contained() {
    let manager = manager();
    let handle = manager
        .launch(|| -> u32 { panic!("malformed request") })
        .unwrap();
    assert_eq!(
        handle.join_with_result().unwrap(),
        ThreadOutcome::Panicked("malformed request".to_string())
    );

    let next = manager.launch(|| 1).unwrap();
    assert!(next.join_with_result().unwrap().is_finished());
}

#[test]
fn join_makes_handler_writes_visible() {
    let manager = manager();
    let handle = manager
        .launch(|| {
            let mut buffer = Vec::with_capacity(1024);
            buffer.extend((0..1024u32).map(|i| i.wrapping_mul(31)));
            buffer
        })
        .unwrap();
    let buffer = handle.join_with_result().unwrap().finished().unwrap();
    assert_eq!(buffer.len(), 1024);
    assert_eq!(buffer[10], 310);
}
