//! Handle on a spawned build process.

use crate::coordination::domain::CoordinationResult;

/// A running build that can be aborted.
#[cfg_attr(test, mockall::automock)]
pub trait BuildProcess: Send {
    /// Operating system process identifier.
    fn id(&self) -> u32;

    /// Terminates the process abruptly.
    ///
    /// A process that already exited is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::coordination::domain::CoordinationError::Process`]
    /// when the signal cannot be delivered.
    fn kill(&mut self) -> CoordinationResult<()>;
}
