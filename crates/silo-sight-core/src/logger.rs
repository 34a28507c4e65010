//! Stderr logging for the `silo_sight*` crates.
//!
//! Records from this workspace are shown down to the requested level and
//! tagged with a short component name (`calib::solver`, `pipeline`). Records
//! from other crates (image decoders, ffmpeg, the corner detector) are capped
//! at `warn` so a `--verbose` run stays readable.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use log::Level;
#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Target prefix shared by every crate of the workspace.
const TARGET_PREFIX: &str = "silo_sight";

/// Ceiling applied to records from outside the workspace.
const FOREIGN_LEVEL: LevelFilter = LevelFilter::Warn;

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(TARGET_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('_') || rest.starts_with("::"))
}

/// Effective filter for `target` when the workspace runs at `level`.
fn target_level(target: &str, level: LevelFilter) -> LevelFilter {
    if is_own_target(target) {
        level
    } else {
        level.min(FOREIGN_LEVEL)
    }
}

/// `silo_sight_calib::solver` -> `calib::solver`, `silo_sight::pipeline` -> `pipeline`.
fn component(target: &str) -> &str {
    if !is_own_target(target) {
        return target;
    }
    let rest = &target[TARGET_PREFIX.len()..];
    let rest = rest
        .strip_prefix('_')
        .or_else(|| rest.strip_prefix("::"))
        .unwrap_or(rest);
    if rest.is_empty() {
        TARGET_PREFIX
    } else {
        rest
    }
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= target_level(metadata.target(), self.level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            component(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger; workspace records pass at `level`, others at
/// `warn` or below.
///
/// Only the first call installs anything.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Default `EnvFilter` directives: workspace crates at `level`, the rest at `warn`.
#[cfg(feature = "tracing")]
fn default_directives(level: Level) -> String {
    format!(
        "{},{TARGET_PREFIX}={}",
        FOREIGN_LEVEL.as_str().to_ascii_lowercase(),
        level.as_str().to_ascii_lowercase()
    )
}

/// Install a `tracing` subscriber. `RUST_LOG` replaces the default
/// workspace-at-`info` filter.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(Level::Info)));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_targets_follow_the_requested_level() {
        for target in ["silo_sight", "silo_sight::pipeline", "silo_sight_calib::solver"] {
            assert_eq!(target_level(target, LevelFilter::Debug), LevelFilter::Debug, "{target}");
        }
    }

    #[test]
    fn foreign_targets_are_capped_at_warn() {
        assert_eq!(target_level("chess_corners::detect", LevelFilter::Debug), LevelFilter::Warn);
        assert_eq!(target_level("silo_sightseeing", LevelFilter::Trace), LevelFilter::Warn);
        // a quieter workspace level still applies to everyone
        assert_eq!(target_level("image::png", LevelFilter::Error), LevelFilter::Error);
    }

    #[test]
    fn components_drop_the_workspace_prefix() {
        assert_eq!(component("silo_sight_calib::solver"), "calib::solver");
        assert_eq!(component("silo_sight::pipeline"), "pipeline");
        assert_eq!(component("silo_sight_score"), "score");
        assert_eq!(component("silo_sight"), "silo_sight");
        assert_eq!(component("ffmpeg_next::format"), "ffmpeg_next::format");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_defaults_scope_info_to_the_workspace() {
        assert_eq!(default_directives(Level::Info), "warn,silo_sight=info");
        assert!(EnvFilter::try_new(default_directives(Level::Debug)).is_ok());
    }

    #[test]
    fn repeated_init_is_a_no_op() {
        init_with_level(LevelFilter::Warn).expect("first init");
        init_with_level(LevelFilter::Debug).expect("second init");
    }
}
