//! Cancellation races and deferred cancellation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use courier_thread::{CancelOutcome, ThreadManager, ThreadOutcome, cancel};
use courier_types::ThreadConfig;

fn manager() -> ThreadManager {
    ThreadManager::new(ThreadConfig::default())
}

#[test]
fn cancel_after_exit_is_success() {
    let manager = manager();
    let handle = manager.launch(|| "quick").unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !handle.is_finished() {
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(handle.cancel().unwrap(), CancelOutcome::AlreadyExited);
    assert_eq!(
        handle.join_with_result().unwrap(),
        ThreadOutcome::Finished("quick")
    );
}

#[test]
fn cancel_before_exit_is_success() {
    let manager = manager();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let handle = manager
        .launch(move || {
            // Channel receive is not a cancellation point.
            let _ = go_rx.recv();
            "finished"
        })
        .unwrap();
    assert_eq!(handle.cancel().unwrap(), CancelOutcome::Requested);
    go_tx.send(()).unwrap();
    assert_eq!(
        handle.join_with_result().unwrap(),
        ThreadOutcome::Finished("finished")
    );
}

#[test]
fn cancel_never_fails_across_timings() {
    let manager = manager();
    for round in 0..200 {
        let handle = manager.launch(move || round).unwrap();
        if round % 3 == 0 {
            std::thread::yield_now();
        }
        let outcome = handle.cancel().unwrap();
        assert!(matches!(
            outcome,
            CancelOutcome::Requested | CancelOutcome::AlreadyExited
        ));
        let joined = handle.join_with_result().unwrap();
        assert_eq!(joined, ThreadOutcome::Finished(round));
    }
}

#[test]
fn cancel_interrupts_sleep() {
    let manager = manager();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let handle = manager
        .launch(move || {
            started_tx.send(()).unwrap();
            loop {
                cancel::sleep(Duration::from_secs(60));
            }
        })
        .unwrap();
    started_rx.recv().unwrap();

    let start = Instant::now();
    assert_eq!(handle.cancel().unwrap(), CancelOutcome::Requested);
    let outcome: ThreadOutcome<()> = handle.join_with_result().unwrap();
    assert_eq!(outcome, ThreadOutcome::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[test]
fn disabled_cancellation_latches_until_reenabled() {
    let manager = manager();
    let progress = Arc::new(AtomicUsize::new(0));
    let ran_past_reenable = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();

    let handle = {
        let progress = Arc::clone(&progress);
        let ran_past_reenable = Arc::clone(&ran_past_reenable);
        manager
            .launch(move || {
                cancel::set_cancelable(false);
                started_tx.send(()).unwrap();
                let _ = go_rx.recv();
                for _ in 0..5 {
                    cancel::testcancel();
                    assert!(cancel::is_requested());
                    progress.fetch_add(1, Ordering::SeqCst);
                }
                cancel::set_cancelable(true);
                cancel::testcancel();
                ran_past_reenable.store(true, Ordering::SeqCst);
            })
            .unwrap()
    };

    started_rx.recv().unwrap();
    assert_eq!(handle.cancel().unwrap(), CancelOutcome::Requested);
    go_tx.send(()).unwrap();

    assert_eq!(handle.join_with_result().unwrap(), ThreadOutcome::Cancelled);
    assert_eq!(progress.load(Ordering::SeqCst), 5);
    assert!(!ran_past_reenable.load(Ordering::SeqCst));
}

#[test]
fn guard_protects_critical_section() {
    let manager = manager();
    let ledger = Arc::new(Mutex::new(Vec::<u32>::new()));
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();

    let handle = {
        let ledger = Arc::clone(&ledger);
        manager
            .launch(move || {
                {
                    let _no_cancel = cancel::disable();
                    started_tx.send(()).unwrap();
                    let _ = go_rx.recv();
                    let mut entries = ledger.lock().unwrap();
                    entries.push(1);
                    cancel::testcancel();
                    entries.push(2);
                }
                assert!(cancel::is_cancelable());
                cancel::testcancel();
                ledger.lock().unwrap().push(3);
            })
            .unwrap()
    };

    started_rx.recv().unwrap();
    handle.cancel().unwrap();
    go_tx.send(()).unwrap();

    assert_eq!(handle.join_with_result().unwrap(), ThreadOutcome::Cancelled);
    let entries = ledger.lock().unwrap();
    assert_eq!(*entries, vec![1, 2]);
}

#[test]
fn checkpoint_error_marks_thread_cancelled() {
    let manager = manager();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let handle = manager
        .launch(move || {
            started_tx.send(()).unwrap();
            let mut iterations = 0u32;
            loop {
                if cancel::checkpoint().is_err() {
                    return iterations;
                }
                iterations += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

    started_rx.recv().unwrap();
    handle.cancel().unwrap();
    assert_eq!(handle.join_with_result().unwrap(), ThreadOutcome::Cancelled);
}

#[test]
fn disabled_sleep_runs_to_completion() {
    let manager = manager();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let handle = manager
        .launch(move || {
            cancel::set_cancelable(false);
            started_tx.send(()).unwrap();
            cancel::sleep(Duration::from_millis(50));
            cancel::set_cancelable(true);
            "slept"
        })
        .unwrap();

    started_rx.recv().unwrap();
    handle.cancel().unwrap();
    // No cancellation point after re-enabling, so the handler completes.
    assert_eq!(
        handle.join_with_result().unwrap(),
        ThreadOutcome::Finished("slept")
    );
}

#[test]
fn scoped_threads_can_be_cancelled() {
    let manager = manager();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let mut polls = 0u64;
    manager.scope(|scope| {
        let handle = scope
            .launch(|| {
                started_tx.send(()).unwrap();
                loop {
                    polls += 1;
                    cancel::sleep(Duration::from_millis(5));
                }
            })
            .unwrap();
        started_rx.recv().unwrap();
        handle.cancel().unwrap();
        let outcome: ThreadOutcome<()> = handle.join_with_result().unwrap();
        assert_eq!(outcome, ThreadOutcome::Cancelled);
    });
    assert!(polls >= 1);
}

/// Waits briefly on the way out, like a graceful connection close.
struct LingeringClose {
    closed: Arc<AtomicBool>,
}

impl Drop for LingeringClose {
    fn drop(&mut self) {
        cancel::sleep(Duration::from_millis(1));
        cancel::testcancel();
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[test]
fn cleanup_during_cancel_unwind_does_not_abort() {
    let manager = manager();
    let closed = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let handle = {
        let closed = Arc::clone(&closed);
        manager
            .launch(move || {
                let _close = LingeringClose { closed };
                started_tx.send(()).unwrap();
                let _ = go_rx.recv();
                cancel::testcancel();
                "not reached"
            })
            .unwrap()
    };

    started_rx.recv().unwrap();
    assert_eq!(handle.cancel().unwrap(), CancelOutcome::Requested);
    go_tx.send(()).unwrap();
    assert_eq!(handle.join_with_result().unwrap(), ThreadOutcome::Cancelled);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn panic_with_latched_cancel_reports_panic() {
    let manager = manager();
    let closed = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let handle = {
        let closed = Arc::clone(&closed);
        manager
            .launch(move || {
                let _close = LingeringClose { closed };
                started_tx.send(()).unwrap();
                let _ = go_rx.recv();
                panic!("handler failed");
            })
            .unwrap()
    };

    started_rx.recv().unwrap();
    assert_eq!(handle.cancel().unwrap(), CancelOutcome::Requested);
    go_tx.send(()).unwrap();
    let outcome: ThreadOutcome<()> = handle.join_with_result().unwrap();
    assert_eq!(outcome, ThreadOutcome::Panicked("handler failed".to_string()));
    assert!(closed.load(Ordering::SeqCst));
}
