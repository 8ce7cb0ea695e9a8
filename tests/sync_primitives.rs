/*!
 * Synchronization Primitives Integration Tests
 *
 * Cross-thread tests for mutex, condvar, semaphore, barrier, and rwlock
 * across the wait backends
 */

use portable_sync::{
    BackendKind, Barrier, Condvar, Deadline, Mutex, RwLock, Semaphore, WaitCell, WaitOutcome,
};
use portable_sync::raw::{RawAtom, RawU32};
use portable_sync::MemOrder;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn all_backends() -> Vec<BackendKind> {
    vec![
        BackendKind::Futex,
        BackendKind::Parker,
        BackendKind::Event,
        BackendKind::Spin,
    ]
}

#[test]
fn test_mutex_counter_every_backend() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 1_000;

    for kind in all_backends() {
        let counter = Arc::new(Mutex::with_backend(0usize, kind));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), THREADS * ROUNDS, "{}", kind.name());
    }
}

#[test]
fn test_mutex_wake_latency() {
    let lock = Arc::new(Mutex::new(()));
    let guard = lock.lock();

    let lock_clone = lock.clone();
    let handle = thread::spawn(move || {
        let start = Instant::now();
        drop(lock_clone.lock());
        start.elapsed()
    });

    // Give the thread time to park
    thread::sleep(Duration::from_millis(50));
    drop(guard);

    let elapsed = handle.join().unwrap();
    // Should wake quickly, not sit out a full poll interval
    assert!(elapsed < Duration::from_millis(500));
}

#[test]
fn test_mutex_deadline_does_not_overshoot() {
    let lock = Mutex::new(());
    let _held = lock.lock();

    let start = Instant::now();
    let result = lock.lock_deadline(Deadline::after(Duration::from_millis(50)));
    let elapsed = start.elapsed();

    assert!(result.is_none());
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500));
}

#[test]
fn test_condvar_multiple_waiters() {
    let pair = Arc::new((Mutex::new(false), Condvar::new()));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let pair = pair.clone();
            thread::spawn(move || {
                let (lock, cv) = &*pair;
                let mut go = lock.lock();
                cv.wait_while(&mut go, |go| !*go);
            })
        })
        .collect();

    // Give threads time to wait
    thread::sleep(Duration::from_millis(100));

    {
        let (lock, cv) = &*pair;
        *lock.lock() = true;
        cv.wake_all();
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_condvar_producer_consumer() {
    const ITEMS: usize = 100;
    let shared = Arc::new((Mutex::new(Vec::new()), Condvar::new()));

    let consumer = {
        let shared = shared.clone();
        thread::spawn(move || {
            let (lock, cv) = &*shared;
            let mut taken = 0;
            while taken < ITEMS {
                let mut queue = lock.lock();
                cv.wait_while(&mut queue, |q: &mut Vec<usize>| q.is_empty());
                taken += queue.drain(..).count();
            }
            taken
        })
    };

    let (lock, cv) = &*shared;
    for i in 0..ITEMS {
        lock.lock().push(i);
        cv.wake_one();
    }

    assert_eq!(consumer.join().unwrap(), ITEMS);
}

#[test]
fn test_semaphore_bounds_concurrency() {
    const PERMITS: u32 = 3;
    const THREADS: usize = 12;

    let sem = Arc::new(Semaphore::new(PERMITS));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let sem = sem.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                sem.down();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                inside.fetch_sub(1, Ordering::SeqCst);
                sem.up(1);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= PERMITS as usize);
    assert_eq!(sem.permits(), PERMITS);
}

#[test]
fn test_semaphore_timeout_then_recovery() {
    let sem = Arc::new(Semaphore::new(0));

    // Nothing posted: the wait must expire
    assert!(!sem.down_deadline(Deadline::after(Duration::from_millis(50))));

    let sem_clone = sem.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        sem_clone.up(1);
    });

    // The same semaphore still delivers a later permit
    assert!(sem.down_deadline(Deadline::after(Duration::from_secs(5))));
    handle.join().unwrap();
}

#[test]
fn test_barrier_rounds_every_backend() {
    const PARTIES: usize = 4;
    const ROUNDS: usize = 10;

    for kind in all_backends() {
        let barrier = Arc::new(Barrier::with_backend(PARTIES as u32, kind));
        let leaders = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..PARTIES)
            .map(|_| {
                let barrier = barrier.clone();
                let leaders = leaders.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        if barrier.wait().is_leader() {
                            leaders.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(leaders.load(Ordering::Relaxed), ROUNDS, "{}", kind.name());
    }
}

#[test]
fn test_rwlock_parallel_readers() {
    const READERS: usize = 8;
    let lock = Arc::new(RwLock::new(0u64));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let lock = lock.clone();
            let running = running.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                let guard = lock.read();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                running.fetch_sub(1, Ordering::SeqCst);
                *guard
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }

    // Readers actually overlapped instead of serializing
    assert!(peak.load(Ordering::SeqCst) > 1);
}

#[test]
fn test_rwlock_writer_blocks_until_readers_leave() {
    let lock = Arc::new(RwLock::new(0u32));
    let reader = lock.read();

    let lock_clone = lock.clone();
    let writer = thread::spawn(move || {
        *lock_clone.write() = 1;
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(*reader, 0);
    drop(reader);

    writer.join().unwrap();
    assert_eq!(*lock.read(), 1);
}

#[test]
fn test_wait_cell_wake_before_wait_is_lost() {
    let cell = WaitCell::with_kind(BackendKind::Parker);
    let word = RawU32::new(0);

    // Wake before anyone is waiting: nobody to receive it
    cell.wake_one(&word);

    // A later wait is not satisfied by the earlier wake
    let outcome = cell.wait(&word, 0, Some(Deadline::after(Duration::from_millis(50))));
    assert_eq!(outcome, WaitOutcome::TimedOut);
}

#[test]
fn test_wait_cell_word_change_ends_the_wait() {
    for kind in all_backends() {
        let cell = Arc::new(WaitCell::with_kind(kind));
        let word = Arc::new(RawU32::new(0));

        let cell_clone = cell.clone();
        let word_clone = word.clone();
        let handle = thread::spawn(move || loop {
            let outcome =
                cell_clone.wait(&word_clone, 0, Some(Deadline::after(Duration::from_secs(5))));
            if word_clone.get(MemOrder::Acquire) != 0 || outcome.timed_out() {
                return outcome;
            }
        });

        thread::sleep(Duration::from_millis(50));
        word.set(1, MemOrder::Release);
        cell.wake_all(&word);

        assert_eq!(handle.join().unwrap(), WaitOutcome::Woken, "{}", kind.name());
    }
}

#[test]
#[cfg(not(any(feature = "force-parker", feature = "force-event", feature = "force-spin")))]
fn test_backend_auto_selection() {
    let lock = portable_sync::RawMutex::new();

    // Futex on Linux, parker elsewhere
    #[cfg(target_os = "linux")]
    assert_eq!(lock.backend().name(), "futex");

    #[cfg(not(target_os = "linux"))]
    assert_eq!(lock.backend().name(), "parker");
}

#[test]
fn test_high_frequency_handoff() {
    const HANDOFFS: usize = 1_000;
    let sem_ping = Arc::new(Semaphore::new(1));
    let sem_pong = Arc::new(Semaphore::new(0));

    let ping = sem_ping.clone();
    let pong = sem_pong.clone();
    let handle = thread::spawn(move || {
        for _ in 0..HANDOFFS {
            ping.down();
            pong.up(1);
        }
    });

    for _ in 0..HANDOFFS {
        sem_pong.down();
        sem_ping.up(1);
    }

    handle.join().unwrap();
    assert_eq!(sem_ping.permits(), 1);
    assert_eq!(sem_pong.permits(), 0);
}
