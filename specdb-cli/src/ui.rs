//! Progress feedback for long-running commands
//!
//! Spinners are suppressed when `--quiet` is passed, `SPECDB_QUIET=1` is set,
//! or stderr is not a TTY.

use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

static QUIET_MODE: OnceLock<bool> = OnceLock::new();

/// Call once at startup with the --quiet flag value.
pub fn init_quiet_mode(quiet_flag: bool) {
    let is_quiet = quiet_flag
        || std::env::var("SPECDB_QUIET").map(|v| v == "1").unwrap_or(false)
        || !std::io::stderr().is_terminal();

    QUIET_MODE.set(is_quiet).ok();
}

pub fn is_quiet() -> bool {
    *QUIET_MODE.get().unwrap_or(&false)
}

/// A spinner, or `None` in quiet mode.
pub fn spinner(msg: impl Into<String>) -> Option<ProgressBar> {
    if is_quiet() {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

fn finish(pb: Option<ProgressBar>, msg: String) {
    if let Some(pb) = pb {
        if let Ok(style) = ProgressStyle::default_spinner().template("{msg}") {
            pb.set_style(style);
        }
        pb.finish_with_message(msg);
    }
}

/// Run a future with a spinner, then show success or failure.
pub async fn with_spinner_async<T, E: std::fmt::Display>(
    msg: impl Into<String>,
    success_msg: impl Into<String>,
    f: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let msg = msg.into();
    let pb = spinner(&msg);

    match f.await {
        Ok(result) => {
            finish(pb, format!("✓ {}", success_msg.into()));
            Ok(result)
        }
        Err(e) => {
            finish(pb, format!("✗ {}: {}", msg, e));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_flag_suppresses_spinners() {
        init_quiet_mode(true);
        assert!(is_quiet());
        assert!(spinner("loading").is_none());
    }
}
