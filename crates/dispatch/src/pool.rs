//! A fixed-size worker pool over a shared work queue.
//!
//! All items are queued up front; workers take them with a nonblocking
//! dequeue and exit cleanly when the queue runs dry — nobody spins. An
//! interrupt at the parent flips the cancellation flag: workers finish their
//! current item, drain out, and the caller observes the interrupt as an
//! error.
//!
//! With a configured inter-item sleep, effective concurrency is forced to
//! one; pacing is only meaningful for serialized fan-out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::thread;
use std::time::Duration;

use crossbeam_channel::TryRecvError;

use crate::{DispatchError, DispatchResult};

static CANCELLED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

/// The process-wide cancellation flag, flipped by the interrupt handler.
pub fn cancel_flag() -> &'static AtomicBool {
    &CANCELLED
}

/// Route Ctrl-C into the cancellation flag. Safe to call more than once.
pub fn install_interrupt_handler() -> DispatchResult<()> {
    let mut result = Ok(());
    INSTALL.call_once(|| {
        result = ctrlc::set_handler(|| CANCELLED.store(true, Ordering::SeqCst))
            .map_err(|e| DispatchError::Signal(e.to_string()));
    });
    result
}

/// Run `work` over every item with at most `num_proc` workers.
///
/// Completion order is unspecified; dispatch order is the order of `items`.
/// Returns [`DispatchError::Interrupted`] when `cancel` was raised, after
/// every worker has drained out.
pub fn run_parallel<T, F>(
    work: F,
    items: Vec<T>,
    num_proc: usize,
    sleep_time: Duration,
    cancel: &AtomicBool,
) -> DispatchResult<()>
where
    T: Send,
    F: Fn(T) + Sync,
{
    let workers = if sleep_time.is_zero() {
        num_proc.max(1)
    } else {
        1
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    for item in items {
        // Receiver outlives this loop; the queue cannot be closed yet.
        let _ = tx.send(item);
    }
    drop(tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let work = &work;
            scope.spawn(move || loop {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                match rx.try_recv() {
                    Ok(item) => {
                        work(item);
                        if !sleep_time.is_zero() && !cancel.load(Ordering::SeqCst) {
                            thread::sleep(sleep_time);
                        }
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            });
        }
    });

    if cancel.load(Ordering::SeqCst) {
        Err(DispatchError::Interrupted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn every_item_is_processed_once() {
        let done = Mutex::new(Vec::new());
        let cancel = AtomicBool::new(false);
        run_parallel(
            |n: u32| done.lock().expect("lock").push(n),
            (0..50).collect(),
            8,
            Duration::ZERO,
            &cancel,
        )
        .expect("pool run");

        let done = done.into_inner().expect("lock");
        assert_eq!(done.len(), 50);
        let unique: BTreeSet<u32> = done.into_iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn concurrency_never_exceeds_num_proc() {
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let cancel = AtomicBool::new(false);

        run_parallel(
            |_: u32| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                current.fetch_sub(1, Ordering::SeqCst);
            },
            (0..32).collect(),
            4,
            Duration::ZERO,
            &cancel,
        )
        .expect("pool run");

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn sleep_time_forces_serial_execution() {
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let cancel = AtomicBool::new(false);

        run_parallel(
            |_: u32| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                current.fetch_sub(1, Ordering::SeqCst);
            },
            (0..6).collect(),
            8,
            Duration::from_millis(1),
            &cancel,
        )
        .expect("pool run");

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_work_list_returns_immediately() {
        let cancel = AtomicBool::new(false);
        run_parallel(|_: u32| {}, Vec::new(), 4, Duration::ZERO, &cancel).expect("pool run");
    }

    #[test]
    fn cancellation_stops_the_drain_and_surfaces_as_interrupted() {
        let processed = AtomicUsize::new(0);
        let cancel = AtomicBool::new(false);

        let result = run_parallel(
            |n: u32| {
                if n == 0 {
                    // First item raises the flag, the way Ctrl-C would.
                    cancel.store(true, Ordering::SeqCst);
                }
                processed.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            },
            (0..100).collect(),
            1,
            Duration::ZERO,
            &cancel,
        );

        assert!(matches!(result, Err(DispatchError::Interrupted)));
        assert!(processed.load(Ordering::SeqCst) < 100);
    }
}
