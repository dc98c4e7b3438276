#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]

use std::fmt;
use std::str::Split;

use rand::Rng;

use super::ring_buffer::DyadicRingBuffer;
use super::track::ParameterTrack;

pub const NUM_TRACKS: usize = 3;

/// Identifies one of the three controlled parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackId {
    Focus,
    SecondDispersion,
    ThirdDispersion,
}

pub const TRACK_IDS: [TrackId; NUM_TRACKS] = [
    TrackId::Focus,
    TrackId::SecondDispersion,
    TrackId::ThirdDispersion,
];

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackId::Focus => write!(f, "focus"),
            TrackId::SecondDispersion => write!(f, "second_dispersion"),
            TrackId::ThirdDispersion => write!(f, "third_dispersion"),
        }
    }
}

/// A track's last two values are equal, so the finite-difference denominator
/// is zero and no derivative exists for it this tick. Recoverable: the track
/// is skipped for the tick and left as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegenerateStep {
    pub track: TrackId,
}

impl fmt::Display for DegenerateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "derivative for {} undefined (zero step between last two values); track skipped this tick",
            self.track
        )
    }
}

/// Everything one tick produces, for persistence and observability.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub iteration: u64,
    /// Latest accepted values: focus, second dispersion, third dispersion.
    pub values: [i32; NUM_TRACKS],
    /// Per-track finite-difference estimates; 0.0 on the seed tick and for
    /// degenerate tracks.
    pub derivatives: [f64; NUM_TRACKS],
    /// Sum of the per-track estimates. Recorded for observability only; it
    /// does not feed back into the update rule.
    pub total_gradient: f64,
    pub sample: f64,
    pub degenerate: [bool; NUM_TRACKS],
    pub converged: bool,
    /// True only for the first tick, which perturbs rather than ascends.
    pub seeded: bool,
}

/// Coordinate-wise finite-difference ascent over the three actuator
/// parameters, driven by one batch-mean brightness sample per tick.
///
/// The derivative estimate is deliberately entangled: all three tracks move
/// on the same tick, so each track's estimate divides the *total* objective
/// change by that track's own last step. A clean coordinate descent would
/// probe one parameter while holding the others fixed; the source system does
/// not, and that behavior is preserved (see DESIGN.md).
#[derive(Debug)]
pub struct AscentOptimizer {
    pub focus: ParameterTrack,
    pub second_dispersion: ParameterTrack,
    pub third_dispersion: ParameterTrack,
    initial_directions: [i8; NUM_TRACKS],
    samples: Vec<f64>,
    tick_count: u64,
    converged_global: bool,
    /// Objective delta below which the signal is considered flat (near the
    /// peak), in brightness units.
    pub count_change_tolerance: f64,

    pub objective_log: DyadicRingBuffer<f64>,
    pub gradient_log: DyadicRingBuffer<f64>,
    pub value_logs: [DyadicRingBuffer<i32>; NUM_TRACKS],
    pub derivative_logs: [DyadicRingBuffer<f64>; NUM_TRACKS],
}

impl AscentOptimizer {
    /// Build an optimizer with directions sampled uniformly from +/-1, one
    /// per track. `log_size_exponent` sizes the telemetry ring buffers.
    #[must_use]
    pub fn new(
        focus: ParameterTrack,
        second_dispersion: ParameterTrack,
        third_dispersion: ParameterTrack,
        log_size_exponent: usize,
    ) -> Option<Self> {
        let mut rng = rand::thread_rng();
        let mut directions = [0_i8; NUM_TRACKS];
        for d in &mut directions {
            *d = if rng.gen::<bool>() { 1 } else { -1 };
        }
        Self::with_directions(
            focus,
            second_dispersion,
            third_dispersion,
            directions,
            log_size_exponent,
        )
    }

    /// As `new`, but with the seed perturbation directions fixed by the
    /// caller.
    #[must_use]
    pub fn with_directions(
        focus: ParameterTrack,
        second_dispersion: ParameterTrack,
        third_dispersion: ParameterTrack,
        initial_directions: [i8; NUM_TRACKS],
        log_size_exponent: usize,
    ) -> Option<Self> {
        Some(AscentOptimizer {
            focus,
            second_dispersion,
            third_dispersion,
            initial_directions,
            samples: Vec::new(),
            tick_count: 0,
            converged_global: false,
            count_change_tolerance: 10.0,
            objective_log: DyadicRingBuffer::new(log_size_exponent)?,
            gradient_log: DyadicRingBuffer::new(log_size_exponent)?,
            value_logs: [
                DyadicRingBuffer::new(log_size_exponent)?,
                DyadicRingBuffer::new(log_size_exponent)?,
                DyadicRingBuffer::new(log_size_exponent)?,
            ],
            derivative_logs: [
                DyadicRingBuffer::new(log_size_exponent)?,
                DyadicRingBuffer::new(log_size_exponent)?,
                DyadicRingBuffer::new(log_size_exponent)?,
            ],
        })
    }

    fn tracks_mut(&mut self) -> [&mut ParameterTrack; NUM_TRACKS] {
        [
            &mut self.focus,
            &mut self.second_dispersion,
            &mut self.third_dispersion,
        ]
    }

    #[must_use]
    pub fn current_values(&self) -> [i32; NUM_TRACKS] {
        [
            self.focus.current_value(),
            self.second_dispersion.current_value(),
            self.third_dispersion.current_value(),
        ]
    }

    #[inline]
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    #[inline]
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.converged_global
    }

    #[inline]
    #[must_use]
    pub fn initial_directions(&self) -> [i8; NUM_TRACKS] {
        self.initial_directions
    }

    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Consume one objective sample and advance the state machine.
    ///
    /// The first call is the seed tick: the sample is recorded as the
    /// baseline reading for the values the hardware currently holds, and each
    /// track is perturbed one unit along its random direction. Every later
    /// call is an ascend tick. Convergence is advisory; ticks keep being
    /// accepted and recorded after it is reached.
    pub fn tick(&mut self, sample: f64) -> TickReport {
        if self.tick_count == 0 {
            self.seed_tick(sample)
        } else {
            self.ascend_tick(sample)
        }
    }

    fn seed_tick(&mut self, sample: f64) -> TickReport {
        self.samples.push(sample);
        let directions = self.initial_directions;
        for (track, dir) in self.tracks_mut().into_iter().zip(directions) {
            track.seed(dir);
        }
        self.tick_count = 1;
        let values = self.current_values();
        self.record_logs(sample, 0.0, values, [0.0; NUM_TRACKS]);
        TickReport {
            iteration: 0,
            values,
            derivatives: [0.0; NUM_TRACKS],
            total_gradient: 0.0,
            sample,
            degenerate: [false; NUM_TRACKS],
            converged: false,
            seeded: true,
        }
    }

    fn ascend_tick(&mut self, sample: f64) -> TickReport {
        let previous = *self
            .samples
            .last()
            .expect("seed tick recorded the baseline sample");
        let delta_y = sample - previous;
        self.samples.push(sample);

        let mut derivatives = [0.0_f64; NUM_TRACKS];
        let mut degenerate = [false; NUM_TRACKS];
        let mut total_gradient = 0.0;
        for (i, track) in self.tracks_mut().into_iter().enumerate() {
            let denominator = f64::from(track.current_value() - track.previous_value());
            if denominator == 0.0 {
                degenerate[i] = true;
                continue;
            }
            let d = delta_y / denominator;
            derivatives[i] = d;
            total_gradient += d;
            track.step(d);
        }

        let iteration = self.tick_count;
        self.tick_count += 1;
        let all_converged = self.focus.converged()
            && self.second_dispersion.converged()
            && self.third_dispersion.converged();
        if all_converged || delta_y.abs() <= self.count_change_tolerance {
            self.converged_global = true;
        }

        let values = self.current_values();
        self.record_logs(sample, total_gradient, values, derivatives);
        TickReport {
            iteration,
            values,
            derivatives,
            total_gradient,
            sample,
            degenerate,
            converged: self.converged_global,
            seeded: false,
        }
    }

    fn record_logs(
        &mut self,
        sample: f64,
        total_gradient: f64,
        values: [i32; NUM_TRACKS],
        derivatives: [f64; NUM_TRACKS],
    ) {
        self.objective_log.push(sample);
        self.gradient_log.push(total_gradient);
        for i in 0..NUM_TRACKS {
            self.value_logs[i].push(values[i]);
            self.derivative_logs[i].push(derivatives[i]);
        }
    }

    /// Route an incoming command to the right component. Returns the response
    /// payload for the sender.
    /// # Errors
    /// Returns `Err(())` if `cmd` does not parse as a valid command.
    pub fn process_command(&mut self, mut cmd: Split<'_, char>) -> Result<String, ()> {
        match cmd.next() {
            Some("TRACK") => {
                let track = match cmd.next() {
                    Some("FOCUS") => &mut self.focus,
                    Some("SECOND_DISPERSION") => &mut self.second_dispersion,
                    Some("THIRD_DISPERSION") => &mut self.third_dispersion,
                    Some(_) | None => return Err(()),
                };
                track.process_command(cmd).map(Option::unwrap_or_default)
            }
            Some("TOLERANCE") => match cmd.collect::<Vec<&str>>()[..] {
                ["SET", x] => {
                    self.count_change_tolerance = x.parse::<f64>().map_err(|_| ())?;
                    Ok(String::new())
                }
                ["GET"] => Ok(self.count_change_tolerance.to_string()),
                _ => Err(()),
            },
            Some("VALUES") => match cmd.collect::<Vec<&str>>()[..] {
                ["GET"] => {
                    let v = self.current_values();
                    Ok(format!("{} {} {}", v[0], v[1], v[2]))
                }
                _ => Err(()),
            },
            Some("CONVERGED") => match cmd.collect::<Vec<&str>>()[..] {
                ["GET"] => Ok(self.converged_global.to_string()),
                _ => Err(()),
            },
            Some(_) | None => Err(()),
        }
    }
}
