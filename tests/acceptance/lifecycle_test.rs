//! Attach/detach lifecycle acceptance tests.
//!
//! These tests verify that hardware is never left armed without an owner
//! and that the clock service registry always reflects the attached set.
//!
//! # Acceptance Criteria
//!
//! - A refused registration leaves the enable bit clear
//! - Detach clears the enable bit before the clock disappears
//! - A detached instance is never reused; re-attach builds a new one
//! - The nominal rate comes from the RST fuses, or 800 MHz without them

use super::common::{sim_fixture, RATE_800MHZ};
use ptp_clock::{attach_at, ClockRegistry, ClockService};
use ptp_common::{ClockConfig, ClockState, DaemonConfig, OutOfRangePolicy, PtpError};
use ptp_hw::{RateSource, SimulatedRegisters, SimulatedRst, CLOCK_RATE_DEFAULT};
use std::sync::Arc;

/// Test a full attach, operate, detach cycle.
#[test]
fn test_attach_operate_detach() {
    let fx = sim_fixture("life_ptp", RATE_800MHZ, 0);
    let clock = Arc::clone(fx.attached.clock());
    assert!(fx.hw.is_enabled());
    assert_eq!(fx.registry.len(), 1);

    clock.set_time(10_000).unwrap();
    fx.hw.advance_cycles(800);
    assert_eq!(clock.get_time().unwrap(), 11_000);

    fx.attached.detach().unwrap();
    assert!(!fx.hw.is_enabled());
    assert!(fx.registry.is_empty());
    assert_eq!(clock.state(), ClockState::Disabled);

    // A stale handle must not re-arm the hardware
    assert!(clock.enable_hardware(0).is_err());
    assert!(!fx.hw.is_enabled());
}

/// Test re-attaching the same hardware after detach.
#[test]
fn test_reattach_builds_new_instance() {
    let registry = Arc::new(ClockRegistry::new());
    let hw = SimulatedRegisters::new("reattach_ptp");

    let first = attach_at(
        hw.clone(),
        RateSource::Fixed(RATE_800MHZ),
        registry.clone(),
        &ClockConfig::default(),
        0,
    )
    .unwrap();
    let first_id = first.id();
    first.detach().unwrap();

    let second = attach_at(
        hw.clone(),
        RateSource::Fixed(RATE_800MHZ),
        registry.clone(),
        &ClockConfig::default(),
        0,
    )
    .unwrap();

    assert_ne!(second.id(), first_id);
    assert!(hw.is_enabled());
    assert_eq!(second.clock().epoch(), 0);
    assert_eq!(registry.ids(), vec![second.id()]);
}

/// Test that a full registry unwinds attach.
#[test]
fn test_full_registry_unwinds_attach() {
    let registry = Arc::new(ClockRegistry::with_capacity(0));
    let hw = SimulatedRegisters::new("full_ptp");

    let result = attach_at(
        hw.clone(),
        RateSource::Fixed(RATE_800MHZ),
        registry.clone(),
        &ClockConfig::default(),
        0,
    );

    assert!(matches!(result, Err(PtpError::RegistrationFailed(_))));
    assert!(!hw.is_enabled());
    assert!(registry.is_empty());
}

/// Test that a duplicate clock name is refused without disturbing the first.
#[test]
fn test_duplicate_name_leaves_first_clock_running() {
    let fx = sim_fixture("dup_ptp", RATE_800MHZ, 0);
    let other_hw = SimulatedRegisters::new("dup_ptp");

    let result = attach_at(
        other_hw.clone(),
        RateSource::Fixed(RATE_800MHZ),
        fx.registry.clone(),
        &ClockConfig::default(),
        0,
    );

    assert!(result.is_err());
    assert!(!other_hw.is_enabled());
    assert!(fx.hw.is_enabled());
    assert_eq!(fx.registry.len(), 1);
    assert!(fx.attached.clock().get_time().is_ok());
}

/// Test rate resolution from the RST block at attach.
#[test]
fn test_rate_resolution_at_attach() {
    let registry = Arc::new(ClockRegistry::new());
    let cases: [(&str, Option<SimulatedRst>, u64); 3] = [
        ("rst_36", Some(SimulatedRst::with_multiplier(36)), 1_800_000_000),
        ("rst_zero", Some(SimulatedRst::with_multiplier(0)), CLOCK_RATE_DEFAULT),
        ("rst_absent", None, CLOCK_RATE_DEFAULT),
    ];

    for (name, rst, expected_hz) in &cases {
        let hw = SimulatedRegisters::new(*name);
        let rate = RateSource::Rst(rst.as_ref().map(|rst| rst as &dyn ptp_hw::RegisterAccess));
        let attached = attach_at(
            hw.clone(),
            rate,
            registry.clone(),
            &ClockConfig::default(),
            0,
        )
        .unwrap();

        assert_eq!(attached.clock().clock_rate_hz(), *expected_hz, "{name}");
        assert_eq!(
            hw.compensation(),
            ptp_clock::base_compensation(*expected_hz).unwrap(),
            "{name}"
        );
    }
    assert!(registry.is_empty());
}

/// Test a configuration-driven attach with the clamp policy.
#[test]
fn test_config_driven_attach() {
    let config = DaemonConfig::from_toml(
        r#"
        [clock]
        name = "cfg_ptp"
        max_adj_ppb = 250000
        out_of_range = "clamp"

        [rate]
        source = "fixed"
        fixed_hz = 1000000000
        "#,
    )
    .unwrap();
    assert_eq!(config.clock.out_of_range, OutOfRangePolicy::Clamp);

    let registry = Arc::new(ClockRegistry::new());
    let hw = SimulatedRegisters::new(config.clock.name.clone());
    let attached = attach_at(
        hw.clone(),
        RateSource::Fixed(config.rate.fixed_hz),
        registry.clone(),
        &config.clock,
        0,
    )
    .unwrap();
    let clock = attached.clock();

    assert_eq!(clock.base_compensation(), 1 << 32);
    clock.adjust_frequency(-1_000_000).unwrap();
    assert_eq!(clock.stats().last_ppb, -250_000);
    assert_eq!(
        hw.compensation(),
        ptp_clock::adjusted_compensation(1 << 32, -250_000)
    );
    assert!(registry.lookup_by_name("cfg_ptp").is_some());

    let id = attached.id();
    drop(attached);
    assert!(registry.unregister(id).is_err());
    assert!(!hw.is_enabled());
}
