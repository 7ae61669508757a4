use std::fmt;
use std::io;
use std::process::{Child, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::LaunchCommand;
use crate::console::Console;
use crate::error::{BootError, Result};

const REAP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    AlreadyExited(ExitStatus),
    Terminated(ExitStatus),
    Killed(ExitStatus),
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shutdown::AlreadyExited(status) => write!(f, "already exited ({})", status),
            Shutdown::Terminated(status) => write!(f, "terminated ({})", status),
            Shutdown::Killed(status) => write!(f, "killed ({})", status),
        }
    }
}

/// Stops the launcher on `shutdown` or, failing that, on drop.
pub struct ChildGuard {
    child: Child,
    program: String,
    grace_period: Duration,
    stopped: bool,
}

impl ChildGuard {
    pub fn spawn(launcher: &LaunchCommand, grace_period: Duration) -> Result<Self> {
        let child = launcher
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BootError::Launch {
                program: launcher.program.clone(),
                source,
            })?;

        info!("{} started as pid {}", launcher.program, child.id());

        Ok(Self {
            child,
            program: launcher.program.clone(),
            grace_period,
            stopped: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn console(&mut self) -> io::Result<Console> {
        Console::from_child(&mut self.child)
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let pid = self.pid();
        self.child
            .try_wait()
            .map_err(|source| BootError::Wait { pid, source })
    }

    /// Stops the child if it is still running and reaps it.
    pub fn shutdown(mut self) -> Result<Shutdown> {
        self.stop()
    }

    fn stop(&mut self) -> Result<Shutdown> {
        let shutdown = self.signal_and_reap()?;
        self.stopped = true;
        Ok(shutdown)
    }

    fn signal_and_reap(&mut self) -> Result<Shutdown> {
        if let Some(status) = self.try_wait()? {
            return Ok(Shutdown::AlreadyExited(status));
        }

        info!("Terminating {}...", self.program);
        terminate(&mut self.child)?;

        let deadline = Instant::now() + self.grace_period;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Shutdown::Terminated(status));
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(REAP_INTERVAL);
        }

        warn!(
            "{} still running {:?} after SIGTERM, killing it",
            self.program, self.grace_period
        );
        let pid = self.pid();
        self.child
            .kill()
            .map_err(|source| BootError::Signal { pid, source })?;
        let status = self
            .child
            .wait()
            .map_err(|source| BootError::Wait { pid, source })?;
        Ok(Shutdown::Killed(status))
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        match self.stop() {
            Ok(shutdown) => info!("{} {}", self.program, shutdown),
            Err(e) => {
                error!("cleanup of {} failed: {}", self.program, e);
                if self.child.kill().is_ok() {
                    let _ = self.child.wait();
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<()> {
    let pid = child.id();
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
        let err = io::Error::last_os_error();
        // Exited between the liveness check and the signal.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(BootError::Signal { pid, source: err });
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<()> {
    let pid = child.id();
    child
        .kill()
        .map_err(|source| BootError::Signal { pid, source })
}
