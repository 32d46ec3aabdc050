//! Moon display pipeline entry point.
//!
//! One synchronous pass per invocation: read configuration and observer
//! location, load the ephemeris, compute the Moon state, compose the frame,
//! publish the bitmap, and hand it to the display driver. Any failure aborts
//! the pass and leaves the previously published bitmap untouched; an
//! external timer simply tries again on the next tick.
//!
//! Flags:
//!   --stdout        render an ASCII frame to the terminal and exit
//!   --at <rfc3339>  pin the instant instead of using the wall clock

#[cfg(test)]
mod tests;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use luna_clock_lib::{config::Config, display, ephemeris::Ephemeris, lunar, output, renderer,
    ObserverLocation};
use std::env;
use std::path::Path;

struct Args {
    stdout_mode: bool,
    at: Option<DateTime<Utc>>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        stdout_mode: false,
        at: None,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--stdout" => args.stdout_mode = true,
            "--at" => {
                let value = it.next().context("--at requires an RFC 3339 timestamp")?;
                let parsed = DateTime::parse_from_rfc3339(&value)
                    .with_context(|| format!("invalid --at timestamp {value:?}"))?;
                args.at = Some(parsed.with_timezone(&Utc));
            }
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = Config::load();
    let instant = args.at.unwrap_or_else(Utc::now);

    let location = ObserverLocation::load(Path::new(&config.paths.config_dir))
        .context("observer location must be provisioned before rendering")?;
    info!(
        "pass at {} for {:.4}, {:.4}",
        instant, location.latitude, location.longitude
    );

    let ephemeris = Ephemeris::load(Path::new(&config.paths.ephemeris_dir), instant)
        .context("loading ephemeris")?;
    let state = lunar::compute(&ephemeris, instant, location)?;

    if args.stdout_mode {
        print!("{}", renderer::draw_ascii(&state, instant));
        return Ok(());
    }

    let canvas = renderer::compose(&state, instant, config.display.spec());
    let published = output::publish(
        &canvas,
        Path::new(&config.paths.scratch_dir),
        &config.paths.output_name,
    )
    .context("scratch directory not writable")?;

    match &config.display.command {
        Some(command) => display::show(command, config.display.mode, &published),
        None => {
            info!("no display command configured, stopping after publish");
            Ok(())
        }
    }
}
