//! Unit tests for event store caching.

mod sqlite_tests;
