//! Unit tests for record shapes.

mod artifact_tests;
