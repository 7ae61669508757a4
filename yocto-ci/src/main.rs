use std::env;
use std::process;

use anyhow::{Context, Result};
use log::{info, warn};
use yocto_ci::config::{self, BootConfig, DEFAULT_IMAGE};
use yocto_ci::verify::{GREEN, RED, RESET};
use yocto_ci::{BootVerifier, Interrupt};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = config::app().get_matches();
    let config = BootConfig::from_matches(&matches).context("invalid command line")?;

    if env::var_os("BUILDDIR").map_or(true, |dir| dir.is_empty()) {
        warn!("BUILDDIR not set. Make sure to source oe-init-build-env first.");
    }
    if config.image_ignored() {
        warn!(
            "--image {} is not passed to {}; booting {}",
            config.image,
            config.launcher.program,
            DEFAULT_IMAGE
        );
    }

    let interrupt = Interrupt::global();
    let report = BootVerifier::new(config).run(&interrupt);
    info!("{} after {:.1}s", report.outcome, report.elapsed.as_secs_f64());

    if report.is_success() {
        println!("\n{}✔ Boot into shell successful!{}", GREEN, RESET);
        Ok(())
    } else {
        println!("\n{}❌ Boot failed or timed out{}", RED, RESET);
        process::exit(1);
    }
}
