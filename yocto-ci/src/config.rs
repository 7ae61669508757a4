use std::fmt;
use std::process::Command;
use std::time::Duration;

use clap::{App, Arg, ArgMatches};

use crate::patterns::SuccessPatterns;

pub const DEFAULT_TIMEOUT_SECS: i64 = 120;
pub const DEFAULT_IMAGE: &str = "starry-minimal-image";
pub const LAUNCHER: &str = "runqemu";

/// Upper bound on one wait for console output.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long a SIGTERM'd launcher gets before SIGKILL.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const READ_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_owned());
        self
    }

    /// `runqemu <image> nographic slirp`
    pub fn runqemu(image: &str) -> Self {
        Self::new(LAUNCHER).arg(image).arg("nographic").arg("slirp")
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Zero or negative times out on the first iteration.
    pub timeout_secs: i64,
    /// Accepted on the command line but not passed to the launcher, which
    /// always boots `DEFAULT_IMAGE`.
    pub image: String,
    pub launcher: LaunchCommand,
    pub patterns: SuccessPatterns,
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub read_backoff: Duration,
}

impl BootConfig {
    pub fn new(timeout_secs: i64) -> Self {
        Self {
            timeout_secs,
            image: DEFAULT_IMAGE.to_owned(),
            launcher: LaunchCommand::runqemu(DEFAULT_IMAGE),
            patterns: SuccessPatterns::default(),
            poll_interval: POLL_INTERVAL,
            grace_period: GRACE_PERIOD,
            read_backoff: READ_BACKOFF,
        }
    }

    pub fn launcher(mut self, launcher: LaunchCommand) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn from_matches(matches: &ArgMatches<'_>) -> Result<Self, clap::Error> {
        let timeout_secs = match matches.value_of("timeout") {
            Some(value) => parse_timeout(value).map_err(clap::Error::value_validation_auto)?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mut config = Self::new(timeout_secs);
        if let Some(image) = matches.value_of("image") {
            config.image = image.to_owned();
        }
        Ok(config)
    }

    /// Whether `--image` asked for something the launcher will not boot.
    pub fn image_ignored(&self) -> bool {
        self.image != DEFAULT_IMAGE
    }
}

fn parse_timeout(value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid timeout `{}`: {}", value, e))
}

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("yocto-ci")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Boots the Yocto image in QEMU and waits for a shell prompt")
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("120")
                .validator(|v| parse_timeout(&v).map(|_| ()))
                .help("Timeout in seconds for QEMU boot"),
        )
        .arg(
            Arg::with_name("image")
                .long("image")
                .value_name("NAME")
                .takes_value(true)
                .default_value(DEFAULT_IMAGE)
                .help("Image name to test"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<BootConfig, clap::Error> {
        let argv = std::iter::once("yocto-ci").chain(args.iter().copied());
        let matches = app().get_matches_from_safe(argv)?;
        BootConfig::from_matches(&matches)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.image, "starry-minimal-image");
        assert!(!config.image_ignored());
        assert_eq!(
            config.launcher.to_string(),
            "runqemu starry-minimal-image nographic slirp"
        );
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.grace_period, Duration::from_secs(5));
    }

    #[test]
    fn negative_timeout_is_accepted() {
        let config = parse(&["--timeout", "-5"]).unwrap();
        assert_eq!(config.timeout_secs, -5);
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        assert!(parse(&["--timeout", "soon"]).is_err());
    }

    #[test]
    fn image_is_not_threaded_into_launcher() {
        let config = parse(&["--image", "core-image-minimal"]).unwrap();
        assert_eq!(config.image, "core-image-minimal");
        assert!(config.image_ignored());
        assert_eq!(config.launcher.args[0], DEFAULT_IMAGE);
    }

    #[test]
    fn launch_command_builds_process_command() {
        let launcher = LaunchCommand::new("sh").arg("-c").arg("exit 0");
        let cmd = launcher.command();
        assert_eq!(cmd.get_program(), "sh");
        assert_eq!(cmd.get_args().count(), 2);
    }
}
