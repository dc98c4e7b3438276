#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]

use std::path::PathBuf;
use std::time::Duration;

use async_std::channel::Receiver;

use super::actuator::{ActuatorFiles, ActuatorState};
use super::communications::OptimizerComms;
use super::feed::{CameraSetup, Frame, ObjectiveFeed};
use super::optimizer::AscentOptimizer;
use super::track::ParameterTrack;
use super::util::{find_file, tomlget, tomlget_or};

/// Per-track bound derivation: the track may move at most `offset` units away
/// from its initial value, and never outside the hard physical limits.
fn track_from_config(
    cfg: &toml::Value,
    section: &str,
    initial_value: i32,
    default_offset: i32,
    hard_lower: i32,
    hard_upper: i32,
) -> Result<ParameterTrack, String> {
    // the macro's fallback arm must yield i64 to line up with as_integer()
    let offset = tomlget_or!(
        cfg,
        section,
        "bound_offset",
        as_integer,
        i32,
        i64::from(default_offset)
    );
    let hard_lower = tomlget_or!(
        cfg,
        section,
        "hard_lower",
        as_integer,
        i32,
        i64::from(hard_lower)
    );
    let hard_upper = tomlget_or!(
        cfg,
        section,
        "hard_upper",
        as_integer,
        i32,
        i64::from(hard_upper)
    );
    let learning_rate = tomlget_or!(cfg, section, "learning_rate", as_float, f64, 0.1);
    ParameterTrack::new(
        initial_value,
        (initial_value - offset).max(hard_lower),
        (initial_value + offset).min(hard_upper),
        learning_rate,
    )
    .map_err(|e| format!("{section}: {e}"))
}

/// Telemetry logs are `2^n` entries long; accept either an explicit exponent
/// or a length to round down.
#[must_use]
fn log_size_exponent(cfg: &toml::Value) -> usize {
    if let Some(exponent) = cfg
        .get("general")
        .and_then(|x| x.get("log_length_exponent"))
        .and_then(toml::Value::as_integer)
    {
        exponent as usize
    } else if let Some(length) = cfg
        .get("general")
        .and_then(|x| x.get("log_length"))
        .and_then(toml::Value::as_integer)
    {
        let exponent = length.checked_ilog2().unwrap_or(0) as usize;
        if (1_i64 << exponent) != length {
            eprintln!(
                "WARN: config explicit log length parameter {} rounded down to 2^{} = {}.",
                length,
                exponent,
                1_i64 << exponent,
            );
        }
        exponent
    } else {
        let exponent = 10;
        eprintln!(
            "WARN: no log length parameter found in configuration file, using default of {}",
            1 << exponent
        );
        exponent
    }
}

pub fn optimizer_from_config(
    cfg: &toml::Value,
    state: &ActuatorState,
) -> Result<AscentOptimizer, String> {
    let focus = track_from_config(cfg, "focus", state.focus(), 20, -200, 200)?;
    let second = track_from_config(cfg, "second_dispersion", state.order2(), 500, 30_000, 40_000)?;
    let third = track_from_config(cfg, "third_dispersion", state.order3(), 2_000, -30_000, -25_000)?;
    let mut out = AscentOptimizer::new(focus, second, third, log_size_exponent(cfg))
        .ok_or("failed to instantiate optimizer struct")?;
    out.count_change_tolerance = tomlget_or!(
        cfg,
        "general",
        "count_change_tolerance",
        as_float,
        f64,
        10.0
    );
    Ok(out)
}

pub fn actuator_from_config(cfg: &toml::Value) -> Result<ActuatorFiles, String> {
    let mirror = PathBuf::from(tomlget_or!(
        cfg,
        "actuator",
        "mirror_file",
        as_str,
        "dm_parameters.txt"
    ));
    let dazzler = PathBuf::from(tomlget_or!(
        cfg,
        "actuator",
        "dazzler_file",
        as_str,
        "dazzler_parameters.txt"
    ));
    let mirror = find_file(&mirror).ok_or_else(|| format!("no such file {}", mirror.display()))?;
    let dazzler =
        find_file(&dazzler).ok_or_else(|| format!("no such file {}", dazzler.display()))?;
    ActuatorFiles::load(&mirror, &dazzler)
}

pub fn feed_from_config(cfg: &toml::Value, frames: Receiver<Frame>) -> ObjectiveFeed {
    ObjectiveFeed::new(
        frames,
        tomlget_or!(cfg, "camera", "image_group", as_integer, u64, 2),
    )
}

pub fn camera_from_config(cfg: &toml::Value) -> Result<CameraSetup, String> {
    Ok(CameraSetup {
        image_dir: PathBuf::from(tomlget!(cfg, "camera", "image_dir", as_str)),
        frame_width: tomlget!(cfg, "camera", "frame_width", as_integer, usize),
        poll_interval: Duration::from_millis(tomlget_or!(
            cfg,
            "camera",
            "poll_interval_ms",
            as_integer,
            u64,
            50
        )),
    })
}

pub async fn comms_from_config(cfg: &toml::Value) -> Result<OptimizerComms, String> {
    let mut out = OptimizerComms::new().ok_or("failed to instantiate comms struct")?;
    out.bind_sockets(
        tomlget_or!(cfg, "general", "logs_port", as_integer, u16, 8080),
        tomlget_or!(cfg, "general", "command_port", as_integer, u16, 8081),
    )
    .await
    .map_err(|e| format!("error [{}] in binding sockets", e))?;
    out.set_log_publish_frequency(tomlget_or!(
        cfg,
        "general",
        "logs_publish_freq_ticks",
        as_integer,
        u32,
        256
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(text: &str) -> toml::Value {
        text.parse().unwrap()
    }

    #[test]
    fn track_bounds_derive_from_initial_value() {
        let cfg = cfg("[focus]\nlearning_rate = 0.2\n");
        let track = track_from_config(&cfg, "focus", -150, 20, -200, 200).unwrap();
        assert_eq!(track.bounds(), (-170, -130));
        assert!((track.learning_rate - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn hard_limits_cap_the_offset_window() {
        let cfg = cfg("");
        let track = track_from_config(&cfg, "focus", -190, 20, -200, 200).unwrap();
        assert_eq!(track.bounds(), (-200, -170));
        let track = track_from_config(&cfg, "second_dispersion", 39_900, 500, 30_000, 40_000)
            .unwrap();
        assert_eq!(track.bounds(), (39_400, 40_000));
    }

    #[test]
    fn misconfigured_hard_limits_abort() {
        // initial value outside the hard window is a fatal config error
        let cfg = cfg("");
        assert!(track_from_config(&cfg, "focus", 300, 20, -200, 200).is_err());
    }

    #[test]
    fn optimizer_defaults() {
        let state = ActuatorState::parse("-150", "order2 = 36100\norder3 = -27000\n").unwrap();
        let cfg = cfg("[general]\nlog_length_exponent = 6\n");
        let opt = optimizer_from_config(&cfg, &state).unwrap();
        assert_eq!(opt.current_values(), [-150, 36_100, -27_000]);
        assert!((opt.count_change_tolerance - 10.0).abs() < f64::EPSILON);
        assert_eq!(opt.focus.bounds(), (-170, -130));
        assert_eq!(opt.second_dispersion.bounds(), (35_600, 36_600));
        assert_eq!(opt.third_dispersion.bounds(), (-29_000, -25_000));
        assert_eq!(opt.objective_log.len(), 64);
    }
}
