//! Hand-off to the external display-driver process.
//!
//! The driver is configured as a command line; the screen-mode selector and
//! the bitmap path are appended as its final two arguments. The child is
//! awaited to completion with a kill timeout so a wedged SPI transaction
//! cannot stall the whole pass forever.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How long the driver may run before it is killed.
const DRIVER_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the configured driver command with `mode` and `image` appended.
/// Nonzero exit, timeout, and spawn failure all surface as errors.
pub fn show(command: &str, mode: u8, image: &Path) -> Result<()> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("display command is empty");
    };
    info!("invoking display driver: {} mode {}", program, mode);

    let mut child = Command::new(program)
        .args(parts)
        .arg(mode.to_string())
        .arg(image)
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to start display driver {program:?}"))?;

    let deadline = Instant::now() + DRIVER_TIMEOUT;
    loop {
        match child.try_wait().context("waiting for display driver")? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => bail!("display driver exited with {status}"),
            None if Instant::now() >= deadline => {
                warn!("display driver still running after {DRIVER_TIMEOUT:?}, killing it");
                let _ = child.kill();
                let _ = child.wait();
                bail!("display driver timed out after {DRIVER_TIMEOUT:?}");
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
}
