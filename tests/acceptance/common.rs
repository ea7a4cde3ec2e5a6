//! Common utilities for acceptance tests.

#![allow(dead_code)] // Not every helper is used by every test module

use ptp_clock::{attach_at, AttachedClock, ClockRegistry};
use ptp_common::ClockConfig;
use ptp_hw::{RateSource, SimulatedRegisters};
use std::sync::Arc;
use std::thread;

/// 800 MHz, the rate a default-fused part runs at.
pub const RATE_800MHZ: u64 = 800_000_000;

/// A simulated clock attached to its own registry.
pub struct SimFixture {
    /// Test-side handle to the simulated hardware.
    pub hw: SimulatedRegisters,
    /// Registry the clock is registered with.
    pub registry: Arc<ClockRegistry>,
    /// The attached clock.
    pub attached: AttachedClock<SimulatedRegisters>,
}

/// Attach a simulated clock at a fixed rate, anchored at `start_ns`.
pub fn sim_fixture(name: &str, rate_hz: u64, start_ns: u64) -> SimFixture {
    let hw = SimulatedRegisters::new(name);
    let registry = Arc::new(ClockRegistry::new());
    let attached = attach_at(
        hw.clone(),
        RateSource::Fixed(rate_hz),
        registry.clone(),
        &ClockConfig::default(),
        start_ns,
    )
    .expect("attach simulated clock");

    SimFixture {
        hw,
        registry,
        attached,
    }
}

/// Run `count` copies of `f` on scoped threads, passing each its index.
pub fn run_parallel<F>(count: usize, f: F)
where
    F: Fn(usize) + Sync,
{
    thread::scope(|scope| {
        for index in 0..count {
            let f = &f;
            scope.spawn(move || f(index));
        }
    });
}
