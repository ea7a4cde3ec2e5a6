//! Acceptance tests for the ThunderX PTP clock.
//!
//! These tests exercise the clock engine the way a deployment does:
//! - Concurrent readers and steering from several threads
//! - Attach/detach lifecycle against a clock service registry
//! - Configuration-driven attach
//!
//! All tests run against the simulated PTP and RST blocks.

mod acceptance;
