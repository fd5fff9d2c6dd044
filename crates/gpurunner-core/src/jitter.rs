//! Jitter schedule
//!
//! A worker normally sleeps `base` between compute operations. With jitter
//! enabled it periodically enters an active window during which the sleep is
//! inflated by `sleep_multiplier`, lowering utilization for a while:
//!
//! ```text
//! Unscheduled --draw onset--> Idle --now >= onset--> Active --now >= end--> Idle
//! ```
//!
//! The schedule is driven with explicit timestamps so callers (and tests) own
//! the clock.

use rand::Rng;
use std::time::{Duration, Instant};

use crate::JitterConfig;

/// Where the schedule currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterPhase {
    /// No onset drawn yet
    Unscheduled,
    /// Waiting for the next onset
    Idle { next_onset: Instant },
    /// Utilization is being lowered until `ends_at`
    Active { started_at: Instant, ends_at: Instant },
}

/// State change produced by a step, for the caller to report
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JitterTransition {
    /// Next onset drawn `delay` from now
    Scheduled { delay: Duration },
    /// Active window of `duration` started
    Started { duration: Duration },
    /// Active window over; next onset `next_in` from now
    Ended { next_in: Duration },
}

/// Result of one step: how long to sleep and what changed
#[derive(Debug, Clone, PartialEq)]
pub struct JitterStep {
    pub sleep: Duration,
    pub transitions: Vec<JitterTransition>,
}

/// Per-worker jitter state machine
#[derive(Debug, Clone)]
pub struct JitterSchedule {
    config: JitterConfig,
    phase: JitterPhase,
}

impl JitterSchedule {
    pub fn new(config: JitterConfig) -> Self {
        Self {
            config,
            phase: JitterPhase::Unscheduled,
        }
    }

    pub fn phase(&self) -> JitterPhase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, JitterPhase::Active { .. })
    }

    /// Draw the next onset from `now` and go idle. Returns the drawn delay.
    pub fn schedule<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> Duration {
        let delay = uniform(rng, self.config.min_interval, self.config.max_interval);
        self.phase = JitterPhase::Idle {
            next_onset: later(now, delay),
        };
        delay
    }

    /// Advance the schedule to `now` and return the sleep for this iteration.
    ///
    /// With jitter disabled this is always exactly `base`.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        base: Duration,
        now: Instant,
        rng: &mut R,
    ) -> JitterStep {
        let mut transitions = Vec::new();
        if !self.config.enabled {
            return JitterStep {
                sleep: base,
                transitions,
            };
        }

        if self.phase == JitterPhase::Unscheduled {
            let delay = self.schedule(now, rng);
            transitions.push(JitterTransition::Scheduled { delay });
        }

        if let JitterPhase::Idle { next_onset } = self.phase {
            if now >= next_onset {
                let duration = uniform(rng, self.config.min_duration, self.config.max_duration);
                self.phase = JitterPhase::Active {
                    started_at: now,
                    ends_at: later(now, duration),
                };
                transitions.push(JitterTransition::Started { duration });
            }
        }

        let sleep = match self.phase {
            JitterPhase::Active { ends_at, .. } if now < ends_at => {
                scale(base, self.config.sleep_multiplier)
            }
            JitterPhase::Active { .. } => {
                let next_in = self.schedule(now, rng);
                transitions.push(JitterTransition::Ended { next_in });
                base
            }
            _ => base,
        };

        JitterStep { sleep, transitions }
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> Duration {
    seconds(rng.random_range(min..=max))
}

/// `Duration` from seconds, saturating instead of panicking
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn scale(base: Duration, factor: f64) -> Duration {
    seconds(base.as_secs_f64() * factor)
}

/// `now + delay`, clamped to the latest instant the platform can represent
fn later(now: Instant, mut delay: Duration) -> Instant {
    loop {
        if let Some(at) = now.checked_add(delay) {
            return at;
        }
        delay /= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn enabled(
        min_interval: f64,
        max_interval: f64,
        min_duration: f64,
        max_duration: f64,
    ) -> JitterConfig {
        JitterConfig {
            enabled: true,
            min_interval,
            max_interval,
            min_duration,
            max_duration,
            sleep_multiplier: 2.0,
        }
    }

    fn within(value: Duration, min: f64, max: f64) -> bool {
        let secs = value.as_secs_f64();
        secs >= min - 1e-9 && secs <= max + 1e-9
    }

    #[test]
    fn test_disabled_always_returns_base() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut schedule = JitterSchedule::new(JitterConfig::default());
        let base = Duration::from_millis(40);
        let t0 = Instant::now();

        for i in 0..1_000 {
            let step = schedule.step(base, t0 + Duration::from_secs(i), &mut rng);
            assert_eq!(step.sleep, base);
            assert!(step.transitions.is_empty());
        }
        assert_eq!(schedule.phase(), JitterPhase::Unscheduled);
    }

    #[test]
    fn test_first_step_schedules_onset() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut schedule = JitterSchedule::new(enabled(10.0, 20.0, 1.0, 2.0));
        let base = Duration::from_secs(1);
        let t0 = Instant::now();

        let step = schedule.step(base, t0, &mut rng);
        assert_eq!(step.sleep, base);
        match step.transitions.as_slice() {
            [JitterTransition::Scheduled { delay }] => assert!(within(*delay, 10.0, 20.0)),
            other => panic!("unexpected transitions: {:?}", other),
        }
        assert!(matches!(schedule.phase(), JitterPhase::Idle { .. }));
    }

    #[test]
    fn test_immediate_onset_inflates_for_exact_window() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut schedule = JitterSchedule::new(enabled(0.0, 0.0, 5.0, 5.0));
        let base = Duration::from_secs(1);
        let inflated = base.mul_f64(2.0);
        let t0 = Instant::now();

        schedule.schedule(t0, &mut rng);

        let step = schedule.step(base, t0, &mut rng);
        assert_eq!(step.sleep, inflated);
        assert_eq!(
            schedule.phase(),
            JitterPhase::Active {
                started_at: t0,
                ends_at: t0 + Duration::from_secs(5),
            }
        );

        // still inside the window
        for secs in [1, 2, 4] {
            let step = schedule.step(base, t0 + Duration::from_secs(secs), &mut rng);
            assert_eq!(step.sleep, inflated);
            assert!(schedule.is_active());
        }

        // window over at exactly five seconds
        let end = t0 + Duration::from_secs(5);
        let step = schedule.step(base, end, &mut rng);
        assert_eq!(step.sleep, base);
        assert!(matches!(
            step.transitions.as_slice(),
            [JitterTransition::Ended { .. }]
        ));
        assert_eq!(schedule.phase(), JitterPhase::Idle { next_onset: end });
    }

    #[test]
    fn test_idle_before_onset_returns_base() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut schedule = JitterSchedule::new(enabled(100.0, 100.0, 5.0, 5.0));
        let base = Duration::from_millis(300);
        let t0 = Instant::now();
        schedule.schedule(t0, &mut rng);

        let step = schedule.step(base, t0 + Duration::from_secs(99), &mut rng);
        assert_eq!(step.sleep, base);
        assert!(!schedule.is_active());

        let step = schedule.step(base, t0 + Duration::from_secs(100), &mut rng);
        assert_eq!(step.sleep, base.mul_f64(2.0));
        assert!(schedule.is_active());
    }

    #[test]
    fn test_zero_length_window_ends_in_same_step() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut schedule = JitterSchedule::new(enabled(0.0, 0.0, 0.0, 0.0));
        let base = Duration::from_secs(1);
        let t0 = Instant::now();
        schedule.schedule(t0, &mut rng);

        let step = schedule.step(base, t0, &mut rng);
        assert_eq!(step.sleep, base);
        assert!(matches!(
            step.transitions.as_slice(),
            [
                JitterTransition::Started { .. },
                JitterTransition::Ended { .. }
            ]
        ));
        assert!(!schedule.is_active());
    }

    #[test]
    fn test_huge_values_saturate() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut config = enabled(0.0, 0.0, 1e12, 1e12);
        config.sleep_multiplier = 1e10;
        let mut schedule = JitterSchedule::new(config);
        let base = Duration::from_secs(10_000_000_000);
        let t0 = Instant::now();
        schedule.schedule(t0, &mut rng);

        let step = schedule.step(base, t0, &mut rng);
        assert_eq!(step.sleep, Duration::MAX);
        assert!(schedule.is_active());

        let mut far = JitterSchedule::new(enabled(1e19, 1e19, 1.0, 1.0));
        far.schedule(t0, &mut rng);
        let step = far.step(base, t0, &mut rng);
        assert_eq!(step.sleep, base);
        assert!(matches!(far.phase(), JitterPhase::Idle { next_onset } if next_onset > t0));
    }

    #[test]
    fn test_draws_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = enabled(0.5, 3.0, 0.25, 1.5);
        let mut schedule = JitterSchedule::new(config);
        let base = Duration::from_millis(100);
        let t0 = Instant::now();
        let mut now = t0;

        for _ in 0..5_000 {
            let step = schedule.step(base, now, &mut rng);
            for transition in &step.transitions {
                match *transition {
                    JitterTransition::Scheduled { delay } => assert!(within(delay, 0.5, 3.0)),
                    JitterTransition::Ended { next_in } => assert!(within(next_in, 0.5, 3.0)),
                    JitterTransition::Started { duration } => {
                        assert!(within(duration, 0.25, 1.5))
                    }
                }
            }
            // active windows never outlive their drawn bounds
            if let JitterPhase::Active { started_at, ends_at } = schedule.phase() {
                assert!(within(ends_at - started_at, 0.25, 1.5));
                assert_eq!(step.sleep, base.mul_f64(2.0));
            } else {
                assert_eq!(step.sleep, base);
            }
            now += step.sleep;
        }
    }
}
