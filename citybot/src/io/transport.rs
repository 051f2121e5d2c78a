//! Device input/output through the Android debug bridge.
//!
//! The [`Transport`] trait decouples the bot from `adb`. Tests use a
//! recording transport that stores gestures without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::detection::Point;
use crate::io::config::AdbConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::vision::ScreenCapture;

/// Screenshots are PNGs of a few hundred KiB; anything beyond this is garbage.
const SCREENSHOT_LIMIT_BYTES: usize = 32 * 1024 * 1024;
const INPUT_OUTPUT_LIMIT_BYTES: usize = 16 * 1024;

/// Taps and swipes on one device.
pub trait Transport {
    fn tap(&self, device_id: &str, point: Point) -> Result<()>;

    fn swipe(&self, device_id: &str, from: Point, to: Point, duration_ms: u64) -> Result<()>;
}

/// Transport that shells out to `adb -s <device> shell input ...`.
#[derive(Debug, Clone)]
pub struct AdbTransport {
    adb_path: PathBuf,
    timeout: Duration,
}

impl AdbTransport {
    pub fn new(adb_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            adb_path: adb_path.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &AdbConfig) -> Self {
        Self::new(&cfg.path, Duration::from_secs(cfg.command_timeout_secs))
    }

    fn command(&self, device_id: &str) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        cmd.arg("-s").arg(device_id);
        cmd
    }

    fn input(&self, device_id: &str, args: &[String], label: &str) -> Result<()> {
        let mut cmd = self.command(device_id);
        cmd.arg("shell").arg("input").args(args);
        run_command_with_timeout(cmd, self.timeout, INPUT_OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run {label}"))?
            .ensure_success(label)?;
        Ok(())
    }
}

impl Transport for AdbTransport {
    #[instrument(skip_all, fields(device = device_id, x = point.x, y = point.y))]
    fn tap(&self, device_id: &str, point: Point) -> Result<()> {
        let args = tap_args(point);
        self.input(device_id, &args, "adb tap")?;
        debug!("tap sent");
        Ok(())
    }

    #[instrument(skip_all, fields(device = device_id, %from, %to, duration_ms))]
    fn swipe(&self, device_id: &str, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        let args = swipe_args(from, to, duration_ms);
        self.input(device_id, &args, "adb swipe")?;
        debug!("swipe sent");
        Ok(())
    }
}

impl ScreenCapture for AdbTransport {
    #[instrument(skip_all, fields(device = device_id))]
    fn capture_png(&self, device_id: &str) -> Result<Vec<u8>> {
        let mut cmd = self.command(device_id);
        cmd.args(["exec-out", "screencap", "-p"]);
        let output = run_command_with_timeout(cmd, self.timeout, SCREENSHOT_LIMIT_BYTES)
            .context("run adb screencap")?
            .ensure_success("adb screencap")?;
        if !output.stdout.starts_with(PNG_MAGIC) {
            bail!("adb screencap returned {} bytes that are not a PNG", output.stdout.len());
        }
        debug!(bytes = output.stdout.len(), "screenshot captured");
        Ok(output.stdout)
    }
}

const PNG_MAGIC: &[u8] = b"\x89PNG";

fn tap_args(point: Point) -> Vec<String> {
    vec!["tap".to_string(), point.x.to_string(), point.y.to_string()]
}

fn swipe_args(from: Point, to: Point, duration_ms: u64) -> Vec<String> {
    vec![
        "swipe".to_string(),
        from.x.to_string(),
        from.y.to_string(),
        to.x.to_string(),
        to.y.to_string(),
        duration_ms.to_string(),
    ]
}
