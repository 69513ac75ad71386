//! Port contracts for coordination.

mod process;

#[cfg(test)]
pub use process::MockBuildProcess;
pub use process::BuildProcess;
