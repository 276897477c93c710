//! Fade-in ramp for playback start
//!
//! The ramp raises the media volume from 0 to the session volume in a fixed
//! number of equal time steps. Curve shapes:
//! - Linear: evenly spaced volume steps (default)
//! - SquareRoot: faster rise early on
//! - S-Curve: slow start and end
//! - Equal Power: sine rise, perceived loudness grows evenly
//!
//! Every curve is monotonically non-decreasing, so a sampled volume never
//! drops while a ramp is running.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::time::Duration;

/// Fade curve type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// Gain equals progress
    #[default]
    Linear,

    /// t^0.5
    SquareRoot,

    /// (1 - cos(pi * t)) / 2
    SCurve,

    /// sin(t * pi / 2)
    EqualPower,
}

impl FadeCurve {
    /// Fade-in gain at a normalized position (0.0 to 1.0)
    #[inline]
    pub fn gain(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::SquareRoot => {
                if t <= 0.0 {
                    0.0
                } else {
                    t.sqrt()
                }
            }
            FadeCurve::SCurve => (1.0 - (PI * t).cos()) * 0.5,
            FadeCurve::EqualPower => (t * PI * 0.5).sin(),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::SquareRoot => "Square Root",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        }
    }
}

/// Stepped volume ramp from 0 to a target level
#[derive(Debug, Clone)]
pub struct FadeRamp {
    curve: FadeCurve,
    target: f32,
    steps: u32,
    step: u32,
    duration: Duration,
}

impl FadeRamp {
    /// Create a ramp to `target` over `duration` in `steps` steps
    ///
    /// A zero step count is treated as a single step.
    pub fn new(curve: FadeCurve, target: f32, duration: Duration, steps: u32) -> Self {
        Self {
            curve,
            target: target.clamp(0.0, 1.0),
            steps: steps.max(1),
            step: 0,
            duration,
        }
    }

    /// Time between two volume updates
    pub fn step_period(&self) -> Duration {
        (self.duration / self.steps).max(Duration::from_millis(1))
    }

    /// Volume before the first step
    pub fn initial_volume(&self) -> f32 {
        self.target * self.curve.gain(0.0)
    }

    /// Advance one step and return the volume to apply
    ///
    /// Returns `None` once the ramp has already completed.
    pub fn advance(&mut self) -> Option<f32> {
        if self.is_complete() {
            return None;
        }
        self.step += 1;
        Some(self.volume())
    }

    /// Volume at the current step
    pub fn volume(&self) -> f32 {
        if self.is_complete() {
            self.target
        } else {
            self.target * self.curve.gain(self.progress())
        }
    }

    /// Progress from 0.0 to 1.0
    pub fn progress(&self) -> f32 {
        self.step as f32 / self.steps as f32
    }

    pub fn is_complete(&self) -> bool {
        self.step >= self.steps
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_curve() {
        let curve = FadeCurve::Linear;
        assert!((curve.gain(0.0) - 0.0).abs() < 0.001);
        assert!((curve.gain(0.5) - 0.5).abs() < 0.001);
        assert!((curve.gain(1.0) - 1.0).abs() < 0.001);
    }

    #[test]
    fn curve_boundaries() {
        for curve in [
            FadeCurve::Linear,
            FadeCurve::SquareRoot,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ] {
            assert!(curve.gain(0.0).abs() < 0.001, "{}", curve.display_name());
            assert!((curve.gain(1.0) - 1.0).abs() < 0.001, "{}", curve.display_name());
            // Out-of-range positions clamp
            assert!(curve.gain(-1.0).abs() < 0.001);
            assert!((curve.gain(2.0) - 1.0).abs() < 0.001);
        }
    }

    #[test]
    fn square_root_rises_faster_than_linear() {
        assert!(FadeCurve::SquareRoot.gain(0.25) > FadeCurve::Linear.gain(0.25));
        assert!(FadeCurve::EqualPower.gain(0.25) > FadeCurve::Linear.gain(0.25));
    }

    #[test]
    fn ramp_reaches_target_in_steps() {
        let mut ramp = FadeRamp::new(FadeCurve::Linear, 0.6, Duration::from_millis(2000), 60);
        assert_eq!(ramp.initial_volume(), 0.0);
        assert_eq!(ramp.step_period(), Duration::from_millis(2000) / 60);

        let mut last = 0.0;
        let mut count = 0;
        while let Some(volume) = ramp.advance() {
            assert!(volume >= last, "ramp went down: {} -> {}", last, volume);
            last = volume;
            count += 1;
        }

        assert_eq!(count, 60);
        assert!(ramp.is_complete());
        assert!((last - 0.6).abs() < 1e-6);
        assert_eq!(ramp.advance(), None);
    }

    #[test]
    fn ramp_halfway_linear() {
        let mut ramp = FadeRamp::new(FadeCurve::Linear, 1.0, Duration::from_millis(1000), 10);
        for _ in 0..5 {
            ramp.advance();
        }
        assert!((ramp.progress() - 0.5).abs() < 1e-6);
        assert!((ramp.volume() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_steps_and_zero_duration() {
        let mut ramp = FadeRamp::new(FadeCurve::Linear, 0.5, Duration::ZERO, 0);
        assert_eq!(ramp.steps(), 1);
        assert_eq!(ramp.step_period(), Duration::from_millis(1));
        assert_eq!(ramp.advance(), Some(0.5));
        assert!(ramp.is_complete());
    }

    #[test]
    fn step_period_never_below_one_millisecond() {
        let ramp = FadeRamp::new(FadeCurve::Linear, 0.5, Duration::from_millis(1), 29);
        assert_eq!(ramp.step_period(), Duration::from_millis(1));

        let ramp = FadeRamp::new(FadeCurve::Linear, 0.5, Duration::from_micros(1500), 2);
        assert_eq!(ramp.step_period(), Duration::from_millis(1));
    }

    #[test]
    fn target_is_clamped() {
        let ramp = FadeRamp::new(FadeCurve::Linear, 3.0, Duration::from_secs(1), 4);
        assert_eq!(ramp.target(), 1.0);
    }
}
