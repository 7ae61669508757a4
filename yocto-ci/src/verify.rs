use std::fmt;
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::BootConfig;
use crate::console::{Console, Recv};
use crate::guard::{ChildGuard, Shutdown};
use crate::interrupt::Interrupt;

pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { pattern: String },
    Timeout { after: Duration },
    /// `code` is `None` when the launcher died from a signal.
    Exited { code: Option<i32> },
    Interrupted,
    LaunchFailed { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { pattern } => write!(f, "found boot success pattern '{}'", pattern),
            Outcome::Timeout { after } => write!(f, "timeout after {} seconds", after.as_secs()),
            Outcome::Exited { code: Some(code) } => write!(f, "QEMU exited with code {}", code),
            Outcome::Exited { code: None } => write!(f, "QEMU was terminated by a signal"),
            Outcome::Interrupted => write!(f, "interrupted by user"),
            Outcome::LaunchFailed { reason } => write!(f, "launch failed: {}", reason),
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub outcome: Outcome,
    pub pid: Option<u32>,
    /// `None` when nothing was spawned or cleanup itself failed.
    pub shutdown: Option<Shutdown>,
    pub elapsed: Duration,
    pub output: String,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

struct BootSession {
    started: Instant,
    buffer: String,
}

impl BootSession {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            buffer: String::new(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn timed_out(&self, timeout_secs: i64) -> bool {
        if timeout_secs < 0 {
            return true;
        }
        self.elapsed() > Duration::from_secs(timeout_secs as u64)
    }
}

pub struct BootVerifier {
    config: BootConfig,
}

impl BootVerifier {
    pub fn new(config: BootConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, interrupt: &Interrupt) -> Report {
        let launcher = &self.config.launcher;
        println!("Starting QEMU: {}", launcher);

        let mut session = BootSession::new();
        let mut guard = match ChildGuard::spawn(launcher, self.config.grace_period) {
            Ok(guard) => guard,
            Err(e) => {
                if e.is_not_found() {
                    error!(
                        "{} command not found. Make sure Yocto environment is sourced.",
                        launcher.program
                    );
                } else {
                    error!("{}", e);
                }
                return Report {
                    outcome: Outcome::LaunchFailed {
                        reason: e.to_string(),
                    },
                    pid: None,
                    shutdown: None,
                    elapsed: session.elapsed(),
                    output: session.buffer,
                };
            }
        };

        let pid = guard.pid();
        let outcome = match guard.console() {
            Ok(console) => self.supervise(&mut guard, &console, &mut session, interrupt),
            Err(e) => {
                error!("failed to attach to {} output: {}", launcher.program, e);
                Outcome::LaunchFailed {
                    reason: e.to_string(),
                }
            }
        };

        let shutdown = match guard.shutdown() {
            Ok(shutdown) => {
                info!("{} {}", launcher.program, shutdown);
                Some(shutdown)
            }
            Err(e) => {
                error!("cleanup of {} failed: {}", launcher.program, e);
                None
            }
        };

        Report {
            outcome,
            pid: Some(pid),
            shutdown,
            elapsed: session.elapsed(),
            output: session.buffer,
        }
    }

    fn supervise(
        &self,
        guard: &mut ChildGuard,
        console: &Console,
        session: &mut BootSession,
        interrupt: &Interrupt,
    ) -> Outcome {
        let config = &self.config;
        loop {
            if session.timed_out(config.timeout_secs) {
                warn!("Timeout after {} seconds", config.timeout_secs);
                return Outcome::Timeout {
                    after: session.elapsed(),
                };
            }

            if interrupt.is_triggered() {
                warn!("Interrupted by user");
                return Outcome::Interrupted;
            }

            match guard.try_wait() {
                Ok(Some(status)) => {
                    warn!("QEMU exited with {}", status);
                    return Outcome::Exited {
                        code: status.code(),
                    };
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }

            match console.next_line(config.poll_interval) {
                Recv::Line(line) => {
                    print!("{}", line);
                    let _ = io::stdout().flush();
                    session.buffer.push_str(&line);

                    if let Some(pattern) = config.patterns.find(&session.buffer) {
                        println!(
                            "\n{}✔ Found boot success pattern: '{}'{}",
                            GREEN, pattern, RESET
                        );
                        return Outcome::Success {
                            pattern: pattern.to_owned(),
                        };
                    }
                }
                Recv::Error(e) => {
                    warn!("Read error: {}", e);
                    thread::sleep(config.read_backoff);
                }
                Recv::Idle | Recv::Closed => {}
            }
        }
    }
}

pub fn run_boot_test(timeout_seconds: i64) -> bool {
    let verifier = BootVerifier::new(BootConfig::new(timeout_seconds));
    verifier.run(&Interrupt::global()).is_success()
}
