//! Concurrency acceptance tests.
//!
//! A control-plane thread steers the clock while packet-path threads read
//! it. These tests verify that readers never observe time moving backwards
//! under forward steering, that no step is lost when many threads adjust
//! at once, and that the lock-free offset stays consistent.
//!
//! # Acceptance Criteria
//!
//! - `get_time` is non-decreasing per reader while only positive steps
//!   and trims are applied
//! - Concurrent symmetric steps cancel exactly
//! - `adjust_offset` converges to the sum of all steps
//! - Converted packet timestamps never lie ahead of a later `get_time`

use super::common::{run_parallel, sim_fixture, RATE_800MHZ};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const START_NS: u64 = 1_700_000_000_000_000_000;

/// Test readers stay monotonic while the clock is stepped and trimmed.
#[test]
fn test_readers_monotonic_while_steered() {
    let fx = sim_fixture("conc_ptp", RATE_800MHZ, START_NS);
    let clock = &**fx.attached.clock();
    let hw = &fx.hw;
    let done = &AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(move || {
            while !done.load(Ordering::Relaxed) {
                hw.advance_cycles(97);
                thread::yield_now();
            }
        });

        let readers: Vec<_> = (0..4)
            .map(move |_| {
                scope.spawn(move || {
                    let mut last = 0u64;
                    let mut reads = 0u64;
                    loop {
                        let now = clock.get_time().expect("get_time");
                        assert!(now >= last, "time went backwards: {now} < {last}");
                        last = now;
                        reads += 1;
                        if done.load(Ordering::Relaxed) {
                            break reads;
                        }
                    }
                })
            })
            .collect();

        for i in 0..2_000i32 {
            clock.adjust_time(3).expect("adjust_time");
            if i % 100 == 0 {
                clock
                    .adjust_frequency((i / 100 % 5) * 10_000)
                    .expect("adjust_frequency");
            }
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().expect("reader panicked") > 0);
        }
    });

    assert_eq!(clock.adjust_offset(), 6_000);
    assert_eq!(clock.stats().time_steps, 2_000);
    assert_eq!(clock.stats().freq_adjustments, 20);
}

/// Test that concurrent symmetric steps cancel without lost updates.
#[test]
fn test_concurrent_steps_are_not_lost() {
    let fx = sim_fixture("sym_ptp", RATE_800MHZ, 0);
    let clock = &**fx.attached.clock();

    fx.hw.advance_cycles(8_000);
    clock.set_time(START_NS).expect("set_time");

    run_parallel(8, |index| {
        let delta = (index as i64 + 1) * 7;
        for _ in 0..500 {
            clock.adjust_time(delta).expect("step up");
            clock.adjust_time(-delta).expect("step down");
        }
    });

    assert_eq!(clock.adjust_offset(), 0);
    assert_eq!(clock.get_time().expect("get_time"), START_NS);
    assert_eq!(clock.stats().time_steps, 8_000);
    assert_eq!(clock.stats().cumulative_step_ns, 0);
    assert_eq!(fx.hw.hook_calls(), 8_000);
    assert_eq!(fx.hw.hook_total_ns(), 0);
}

/// Test the lock-free offset seen by a packet-path thread.
#[test]
fn test_lock_free_offset_is_monotonic_under_positive_steps() {
    const STEPS: i64 = 5_000;

    let fx = sim_fixture("offset_ptp", RATE_800MHZ, 0);
    let clock = &**fx.attached.clock();
    let done = &AtomicBool::new(false);

    thread::scope(|scope| {
        let observer = scope.spawn(move || {
            let mut last = 0i64;
            loop {
                let offset = clock.adjust_offset();
                assert!(offset >= last, "offset went backwards: {offset} < {last}");
                assert!(offset <= STEPS);
                last = offset;
                if done.load(Ordering::Acquire) {
                    break;
                }
            }
        });

        for _ in 0..STEPS {
            clock.adjust_time(1).expect("adjust_time");
        }
        done.store(true, Ordering::Release);
        observer.join().expect("observer panicked");
    });

    assert_eq!(clock.adjust_offset(), STEPS);
}

/// Test packet timestamp conversion against a running counter.
#[test]
fn test_packet_timestamps_never_ahead_of_clock() {
    let fx = sim_fixture("pkt_ptp", RATE_800MHZ, START_NS);
    let clock = &**fx.attached.clock();
    let hw = &fx.hw;
    let done = &AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(move || {
            while !done.load(Ordering::Relaxed) {
                hw.advance_cycles(800);
                thread::yield_now();
            }
        });

        let engines: Vec<_> = (0..3)
            .map(move |_| {
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        let latched = hw.counter();
                        let stamped = clock.cycles_to_time(latched).expect("cycles_to_time");
                        let now = clock.get_time().expect("get_time");
                        assert!(stamped <= now, "timestamp {stamped} ahead of clock {now}");
                        assert!(stamped >= START_NS);
                    }
                })
            })
            .collect();

        for engine in engines {
            engine.join().expect("packet engine panicked");
        }
        done.store(true, Ordering::Relaxed);
    });
}
