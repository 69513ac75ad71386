//! Unit tests for the build lifecycle.

mod event_service_tests;
