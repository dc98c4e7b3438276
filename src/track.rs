#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::str::Split;

/// The seed value handed to a track lies outside the supplied physical
/// limits. This means a misconfigured actuator bound, so construction aborts
/// rather than silently clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsViolation {
    pub initial_value: i32,
    pub lower_bound: i32,
    pub upper_bound: i32,
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initial value {} outside physical bounds [{}, {}]",
            self.initial_value, self.lower_bound, self.upper_bound
        )
    }
}

/// One bounded integer actuator parameter under optimization: its physical
/// limits, learning rate, and the full history of accepted values.
///
/// Two distinct update rules apply over a run. The seed perturbation moves
/// the value by exactly one unit in a fixed direction, independent of the
/// learning rate. Every later update scales the supplied derivative estimate
/// by the learning rate, and once the proposed step magnitude drops below one
/// physical unit the track freezes for the rest of the run.
#[derive(Debug)]
pub struct ParameterTrack {
    lower_bound: i32,
    upper_bound: i32,
    pub learning_rate: f64,
    value_history: Vec<i32>,
    derivative_history: Vec<f64>,
    converged: bool,
}

impl ParameterTrack {
    /// # Errors
    /// Returns `BoundsViolation` if `initial_value` is not within
    /// `[lower_bound, upper_bound]`.
    pub fn new(
        initial_value: i32,
        lower_bound: i32,
        upper_bound: i32,
        learning_rate: f64,
    ) -> Result<Self, BoundsViolation> {
        if initial_value < lower_bound || initial_value > upper_bound {
            return Err(BoundsViolation {
                initial_value,
                lower_bound,
                upper_bound,
            });
        }
        Ok(ParameterTrack {
            lower_bound,
            upper_bound,
            learning_rate,
            value_history: vec![initial_value],
            derivative_history: Vec::new(),
            converged: false,
        })
    }

    /// Apply the one-shot random perturbation: move one unit along
    /// `direction` (+1 or -1), clipped to the physical bounds.
    pub fn seed(&mut self, direction: i8) {
        let perturbed =
            (self.current_value() + i32::from(direction)).clamp(self.lower_bound, self.upper_bound);
        self.value_history.push(perturbed);
    }

    /// Take one learning-rate-scaled step along `derivative`. If the scaled
    /// step magnitude is below one actuator unit the track freezes instead;
    /// at exactly one unit the step is taken. Rounding is half-to-even.
    /// No-op once the track has converged.
    pub fn step(&mut self, derivative: f64) {
        if self.converged {
            return;
        }
        let scaled = self.learning_rate * derivative;
        if scaled.abs() < 1.0 {
            self.converged = true;
            return;
        }
        let raw = f64::from(self.current_value()) + scaled;
        let next = raw
            .clamp(f64::from(self.lower_bound), f64::from(self.upper_bound))
            .round_ties_even() as i32;
        self.value_history.push(next);
        self.derivative_history.push(derivative);
    }

    #[inline]
    #[must_use]
    pub fn current_value(&self) -> i32 {
        self.value_history[self.value_history.len() - 1]
    }

    /// Value before the most recent accepted update.
    /// # Panics
    /// Panics if called before the track has been seeded.
    #[inline]
    #[must_use]
    pub fn previous_value(&self) -> i32 {
        self.value_history[self.value_history.len() - 2]
    }

    #[inline]
    #[must_use]
    pub fn converged(&self) -> bool {
        self.converged
    }

    #[inline]
    #[must_use]
    pub fn bounds(&self) -> (i32, i32) {
        (self.lower_bound, self.upper_bound)
    }

    #[must_use]
    pub fn value_history(&self) -> &[i32] {
        &self.value_history
    }

    #[must_use]
    pub fn derivative_history(&self) -> &[f64] {
        &self.derivative_history
    }

    /// Handle a remote get/set on this track. Returns the response payload,
    /// if the command produces one.
    /// # Errors
    /// Returns `Err(())` if `cmd` does not parse as a valid command.
    pub fn process_command(&mut self, cmd: Split<'_, char>) -> Result<Option<String>, ()> {
        match cmd.collect::<Vec<&str>>()[..] {
            ["LEARNING_RATE", "SET", x] => {
                let rate = x.parse::<f64>().map_err(|_| ())?;
                if rate > 0.0 && rate.is_finite() {
                    self.learning_rate = rate;
                    Ok(None)
                } else {
                    Err(())
                }
            }
            ["LEARNING_RATE", "GET"] => Ok(Some(self.learning_rate.to_string())),
            ["VALUE", "GET"] => Ok(Some(self.current_value().to_string())),
            ["BOUNDS", "GET"] => Ok(Some(format!("{} {}", self.lower_bound, self.upper_bound))),
            ["CONVERGED", "GET"] => Ok(Some(self.converged.to_string())),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(initial: i32, lo: i32, hi: i32) -> ParameterTrack {
        ParameterTrack::new(initial, lo, hi, 0.1).expect("valid construction")
    }

    #[test]
    fn rejects_out_of_bounds_seed_value() {
        let err = ParameterTrack::new(250, -200, 200, 0.1).unwrap_err();
        assert_eq!(
            err,
            BoundsViolation {
                initial_value: 250,
                lower_bound: -200,
                upper_bound: 200
            }
        );
        assert!(ParameterTrack::new(-200, -200, 200, 0.1).is_ok());
        assert!(ParameterTrack::new(200, -200, 200, 0.1).is_ok());
    }

    #[test]
    fn seed_moves_one_unit_and_clips() {
        let mut t = track(-150, -200, 200);
        t.seed(1);
        assert_eq!(t.current_value(), -149);
        assert_eq!(t.previous_value(), -150);

        let mut t = track(200, -200, 200);
        t.seed(1);
        assert_eq!(t.current_value(), 200);

        let mut t = track(-200, -200, 200);
        t.seed(-1);
        assert_eq!(t.current_value(), -200);
    }

    #[test]
    fn step_stays_within_bounds() {
        let mut t = track(195, -200, 200);
        t.step(1.0e6);
        assert_eq!(t.current_value(), 200);
        // pushing further in the same direction holds at the bound
        t.step(1.0e6);
        assert_eq!(t.current_value(), 200);
        assert!(!t.converged());
    }

    #[test]
    fn threshold_boundary_is_active() {
        // |learning_rate * derivative| == 1 exactly: the step is taken
        let mut t = track(0, -200, 200);
        t.step(10.0);
        assert_eq!(t.current_value(), 1);
        assert!(!t.converged());
        // just under one unit: frozen
        t.step(9.9);
        assert_eq!(t.current_value(), 1);
        assert!(t.converged());
    }

    #[test]
    fn converged_is_monotonic() {
        let mut t = track(0, -200, 200);
        t.step(0.5);
        assert!(t.converged());
        // a large derivative after freezing must not reactivate the track
        t.step(1.0e4);
        assert!(t.converged());
        assert_eq!(t.current_value(), 0);
        assert_eq!(t.value_history(), &[0]);
    }

    #[test]
    fn rounds_half_to_even() {
        let mut t = track(0, -200, 200);
        t.step(25.0); // raw 2.5 rounds to 2
        assert_eq!(t.current_value(), 2);
        let mut t = track(0, -200, 200);
        t.step(35.0); // raw 3.5 rounds to 4
        assert_eq!(t.current_value(), 4);
        let mut t = track(0, -200, 200);
        t.step(-25.0); // raw -2.5 rounds to -2
        assert_eq!(t.current_value(), -2);
    }

    #[test]
    fn histories_track_accepted_steps() {
        let mut t = track(10, -200, 200);
        t.seed(-1);
        t.step(20.0);
        t.step(-30.0);
        assert_eq!(t.value_history(), &[10, 9, 11, 8]);
        assert_eq!(t.derivative_history(), &[20.0, -30.0]);
    }

    #[test]
    fn command_roundtrip() {
        let mut t = track(5, -10, 10);
        assert_eq!(
            t.process_command("VALUE:GET".split(':')),
            Ok(Some("5".to_string()))
        );
        assert_eq!(
            t.process_command("BOUNDS:GET".split(':')),
            Ok(Some("-10 10".to_string()))
        );
        assert_eq!(t.process_command("LEARNING_RATE:SET:0.25".split(':')), Ok(None));
        assert!((t.learning_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(t.process_command("LEARNING_RATE:SET:-1".split(':')), Err(()));
        assert_eq!(t.process_command("NONSENSE".split(':')), Err(()));
    }
}
