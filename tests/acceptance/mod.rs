//! Acceptance test modules.

mod common;
mod concurrency_test;
mod lifecycle_test;
