//! Unit tests for coordination.

mod envelope_tests;
mod lease_tests;
