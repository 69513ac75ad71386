//! Unit tests for relay queues and transports.
