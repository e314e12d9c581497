//! Looping and one-shot visual timelines.
//!
//! Driven by real frame time, not by engine ticks. Nothing here feeds back
//! into the game or the calculator.

use crate::model::TickEvent;
use std::f32::consts::TAU;
use std::time::Duration;

const GROUND_PERIOD: Duration = Duration::from_millis(500);
const GROUND_TRAVEL: f32 = 50.0;
const CLAW_PERIOD: Duration = Duration::from_millis(400);

const CLOUD_ENTRY: f32 = 100.0; // past the right border
const CLOUD_EXIT: f32 = -150.0;
const CLOUD_PASS_MS: f32 = 10_000.0;

/// (start x, y, speed, size)
const CLOUDS: [(f32, f32, f32, f32); 3] = [
    (50.0, 20.0, 0.8, 0.8),
    (250.0, 50.0, 1.2, 1.2),
    (400.0, 10.0, 0.5, 0.6),
];

const PULSE_RISE_MS: f32 = 100.0;
const PULSE_PEAK: f32 = 1.5;
const PULSE_TOTAL: Duration = Duration::from_millis(800);

const FLASH_IN_MS: f32 = 200.0;
const FLASH_HOLD_MS: f32 = 1000.0;
const FLASH_OUT_MS: f32 = 500.0;
const FLASH_TOTAL: Duration = Duration::from_millis(1700);

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Cloud {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) speed: f32,
    pub(crate) size: f32,
}

pub(crate) struct Timelines {
    elapsed: Duration,
    pub(crate) clouds: Vec<Cloud>,
    pulse: Option<Duration>,
    milestone: Option<Duration>,
}

impl Timelines {
    pub(crate) fn new() -> Self {
        let clouds = CLOUDS
            .iter()
            .map(|&(x, y, speed, size)| Cloud { x, y, speed, size })
            .collect();
        Self {
            elapsed: Duration::ZERO,
            clouds,
            pulse: None,
            milestone: None,
        }
    }

    pub(crate) fn advance(&mut self, dt: Duration, screen_width: f32) {
        self.elapsed += dt;
        let dt_ms = dt.as_secs_f32() * 1000.0;
        let entry = screen_width + CLOUD_ENTRY;
        for c in &mut self.clouds {
            let pass_ms = CLOUD_PASS_MS / c.speed;
            c.x -= (entry - CLOUD_EXIT) / pass_ms * dt_ms;
            if c.x <= CLOUD_EXIT {
                c.x = entry;
            }
        }
        self.pulse = self.pulse.map(|t| t + dt).filter(|t| *t < PULSE_TOTAL);
        self.milestone = self.milestone.map(|t| t + dt).filter(|t| *t < FLASH_TOTAL);
    }

    /// Score changes kick off the pulse, and every tenth point the milestone flash.
    pub(crate) fn observe(&mut self, event: TickEvent, score: u32) {
        if event != TickEvent::Scored || score == 0 {
            return;
        }
        self.pulse = Some(Duration::ZERO);
        if score % 10 == 0 {
            self.milestone = Some(Duration::ZERO);
        }
    }

    /// Horizontal shift of the ground tiles, 0 down to -50 px.
    pub(crate) fn ground_offset(&self) -> f32 {
        -GROUND_TRAVEL * phase(self.elapsed, GROUND_PERIOD)
    }

    /// 0 at rest, 1 at the top of the claw wiggle.
    pub(crate) fn claw_lift(&self) -> f32 {
        let p = phase(self.elapsed, CLAW_PERIOD);
        if p < 0.5 {
            p * 2.0
        } else {
            (1.0 - p) * 2.0
        }
    }

    pub(crate) fn score_scale(&self) -> f32 {
        let Some(t) = self.pulse else {
            return 1.0;
        };
        let ms = t.as_secs_f32() * 1000.0;
        if ms < PULSE_RISE_MS {
            return 1.0 + (PULSE_PEAK - 1.0) * ms / PULSE_RISE_MS;
        }
        // underdamped settle back to 1
        let s = ms - PULSE_RISE_MS;
        1.0 + (PULSE_PEAK - 1.0) * (-s / 120.0).exp() * (TAU * s / 250.0).cos()
    }

    pub(crate) fn milestone_opacity(&self) -> f32 {
        let Some(t) = self.milestone else {
            return 0.0;
        };
        let ms = t.as_secs_f32() * 1000.0;
        if ms < FLASH_IN_MS {
            ms / FLASH_IN_MS
        } else if ms < FLASH_IN_MS + FLASH_HOLD_MS {
            1.0
        } else {
            (1.0 - (ms - FLASH_IN_MS - FLASH_HOLD_MS) / FLASH_OUT_MS).max(0.0)
        }
    }

    pub(crate) fn gold_sky(&self) -> bool {
        self.milestone.is_some()
    }
}

fn phase(t: Duration, period: Duration) -> f32 {
    let p = period.as_nanos().max(1);
    (t.as_nanos() % p) as f32 / p as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn ground_scroll_loops() {
        let mut t = Timelines::new();
        t.advance(ms(250), 400.0);
        assert_eq!(t.ground_offset(), -25.0);
        t.advance(ms(250), 400.0);
        assert_eq!(t.ground_offset(), 0.0);
    }

    #[test]
    fn claw_goes_up_and_down() {
        let mut t = Timelines::new();
        t.advance(ms(100), 400.0);
        assert_eq!(t.claw_lift(), 0.5);
        t.advance(ms(100), 400.0);
        assert_eq!(t.claw_lift(), 1.0);
        t.advance(ms(200), 400.0);
        assert_eq!(t.claw_lift(), 0.0);
    }

    #[test]
    fn clouds_drift_left_and_wrap() {
        let mut t = Timelines::new();
        let start = t.clouds[1].x;
        t.advance(ms(100), 400.0);
        assert!(t.clouds[1].x < start);
        // the slowest cloud needs 20s per pass
        for _ in 0..250 {
            t.advance(ms(100), 400.0);
        }
        for c in &t.clouds {
            assert!(c.x > CLOUD_EXIT && c.x <= 400.0 + CLOUD_ENTRY);
        }
    }

    #[test]
    fn pulse_peaks_then_settles() {
        let mut t = Timelines::new();
        assert_eq!(t.score_scale(), 1.0);
        t.observe(TickEvent::Scored, 3);
        t.advance(ms(100), 400.0);
        assert!((t.score_scale() - PULSE_PEAK).abs() < 1e-3);
        t.advance(ms(800), 400.0);
        assert_eq!(t.score_scale(), 1.0);
    }

    #[test]
    fn zero_score_does_not_pulse() {
        let mut t = Timelines::new();
        t.observe(TickEvent::Scored, 0);
        t.observe(TickEvent::Collided, 5);
        t.advance(ms(50), 400.0);
        assert_eq!(t.score_scale(), 1.0);
    }

    #[test]
    fn milestone_flash_every_tenth_point() {
        let mut t = Timelines::new();
        t.observe(TickEvent::Scored, 9);
        assert!(!t.gold_sky());
        t.observe(TickEvent::Scored, 10);
        assert!(t.gold_sky());
        t.advance(ms(100), 400.0);
        assert!((t.milestone_opacity() - 0.5).abs() < 1e-3);
        t.advance(ms(500), 400.0);
        assert_eq!(t.milestone_opacity(), 1.0);
        t.advance(ms(850), 400.0);
        assert!((t.milestone_opacity() - 0.5).abs() < 1e-3);
        t.advance(ms(300), 400.0);
        assert!(!t.gold_sky());
        assert_eq!(t.milestone_opacity(), 0.0);
    }
}
