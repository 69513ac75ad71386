//! Build processes terminated with `SIGKILL`.

use crate::coordination::{
    domain::{CoordinationError, CoordinationResult},
    ports::BuildProcess,
};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::debug;

/// Build process addressed by its process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalledProcess {
    pid: u32,
}

impl SignalledProcess {
    /// Wraps a process identifier.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl BuildProcess for SignalledProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn kill(&mut self) -> CoordinationResult<()> {
        let raw = i32::try_from(self.pid)
            .map_err(|err| CoordinationError::process(self.pid, err))?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                debug!(pid = self.pid, "build process already gone");
                Ok(())
            }
            Err(err) => Err(CoordinationError::process(self.pid, err)),
        }
    }
}
