//! Runtime selection of kernel launch configurations
//!
//! The autotuner brackets one launch with [`Autotuner::begin`] and
//! [`Autotuner::end`]. While sweeping it hands out every candidate
//! `nsamples` times, then keeps the candidate with the lowest median time
//! for `period` launches before sweeping again.
//!
//! ```text
//! let block_size = tuner.begin();
//! launch(block_size);   // must have completed before end()
//! tuner.end();
//! ```

use crate::ComputeError;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TunerState {
    Scanning { candidate: usize, sample: usize },
    Idle { launches: u32 },
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    value: u32,
    started: Instant,
}

#[derive(Debug, Clone)]
pub struct Autotuner {
    name: String,
    candidates: Vec<u32>,
    samples: Vec<Vec<Duration>>,
    nsamples: usize,
    period: u32,
    enabled: bool,
    selected: u32,
    state: TunerState,
    in_flight: Option<InFlight>,
}

impl Autotuner {
    /// Create a tuner over `candidates`. The first candidate is used until the
    /// first sweep completes.
    pub fn new(
        name: impl Into<String>,
        candidates: Vec<u32>,
        nsamples: usize,
        period: u32,
    ) -> Result<Self, ComputeError> {
        let name = name.into();

        let mut unique = Vec::with_capacity(candidates.len());
        for c in candidates {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }

        let Some(&first) = unique.first() else {
            return Err(ComputeError::InvalidTunerConfig {
                name,
                message: "no candidate configurations".to_string(),
            });
        };
        if nsamples == 0 {
            return Err(ComputeError::InvalidTunerConfig {
                name,
                message: "at least one sample per candidate is required".to_string(),
            });
        }
        if period == 0 {
            return Err(ComputeError::InvalidPeriod);
        }

        Ok(Self {
            samples: vec![vec![Duration::ZERO; nsamples]; unique.len()],
            name,
            candidates: unique,
            nsamples,
            period,
            enabled: true,
            selected: first,
            state: TunerState::Scanning {
                candidate: 0,
                sample: 0,
            },
            in_flight: None,
        })
    }

    /// Use `value` until the first sweep completes, if it is a candidate
    pub fn with_default(mut self, value: u32) -> Self {
        if self.candidates.contains(&value) {
            self.selected = value;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[u32] {
        &self.candidates
    }

    /// Configuration used outside of sweeps
    pub fn selected(&self) -> u32 {
        self.selected
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_scanning(&self) -> bool {
        self.enabled && matches!(self.state, TunerState::Scanning { .. })
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// Number of launches in one full sweep
    pub fn sweep_len(&self) -> usize {
        self.candidates.len() * self.nsamples
    }

    /// Enable or disable tuning. Re-enabling starts a fresh sweep.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.start_sweep();
        }
        self.enabled = enabled;
    }

    /// Set the number of launches between sweeps. A sweep in progress is not
    /// interrupted.
    pub fn set_period(&mut self, period: u32) -> Result<(), ComputeError> {
        if period == 0 {
            return Err(ComputeError::InvalidPeriod);
        }
        self.period = period;
        Ok(())
    }

    /// Configuration the next `begin` will hand out, without starting a
    /// timer. Lets a caller compile or refuse it before timing starts.
    pub fn peek(&self) -> u32 {
        match self.state {
            TunerState::Scanning { candidate, .. } if self.enabled => self.candidates[candidate],
            _ => self.selected,
        }
    }

    /// Pick the configuration for the next launch and start its timer
    pub fn begin(&mut self) -> u32 {
        let value = self.peek();
        self.in_flight = Some(InFlight {
            value,
            started: Instant::now(),
        });
        value
    }

    /// Stop the timer of the launch started by the last `begin`
    pub fn end(&mut self) {
        if let Some(flight) = self.in_flight {
            self.record(flight.started.elapsed());
        }
    }

    /// Record an externally measured duration for the launch started by the
    /// last `begin`
    pub fn end_with(&mut self, elapsed: Duration) {
        self.record(elapsed);
    }

    /// The configuration handed out by the last `begin` was refused by the
    /// execution target. It is never handed out again.
    pub fn reject_current(&mut self) -> Result<(), ComputeError> {
        match self.in_flight.take() {
            Some(flight) => self.reject(flight.value),
            None => Ok(()),
        }
    }

    /// Permanently remove `value` from the candidate set
    pub fn reject(&mut self, value: u32) -> Result<(), ComputeError> {
        let Some(index) = self.candidates.iter().position(|&c| c == value) else {
            return Ok(());
        };

        log::warn!(
            "{}: launch configuration {} refused by the execution target, excluding it",
            self.name,
            value
        );
        self.candidates.remove(index);
        self.samples.remove(index);

        let Some(&first) = self.candidates.first() else {
            return Err(ComputeError::NoViableLaunchConfig(self.name.clone()));
        };

        let lost_selection = self.selected == value;
        if lost_selection {
            self.selected = first;
        }

        match self.state {
            TunerState::Scanning { candidate, sample } => {
                let candidate = if index < candidate {
                    candidate - 1
                } else {
                    candidate
                };
                if candidate >= self.candidates.len() {
                    self.advance_round(sample);
                } else {
                    self.state = TunerState::Scanning { candidate, sample };
                }
            }
            TunerState::Idle { .. } => {
                if lost_selection && self.enabled {
                    self.start_sweep();
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, elapsed: Duration) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        if !self.enabled {
            return;
        }

        match self.state {
            TunerState::Scanning { candidate, sample } => {
                // Launch began before a re-enable restarted the sweep
                if self.candidates[candidate] != flight.value {
                    return;
                }
                self.samples[candidate][sample] = elapsed;
                if candidate + 1 >= self.candidates.len() {
                    self.advance_round(sample);
                } else {
                    self.state = TunerState::Scanning {
                        candidate: candidate + 1,
                        sample,
                    };
                }
            }
            TunerState::Idle { launches } => {
                let launches = launches + 1;
                if launches >= self.period {
                    self.start_sweep();
                } else {
                    self.state = TunerState::Idle { launches };
                }
            }
        }
    }

    fn advance_round(&mut self, sample: usize) {
        if sample + 1 >= self.nsamples {
            self.finish_sweep();
        } else {
            self.state = TunerState::Scanning {
                candidate: 0,
                sample: sample + 1,
            };
        }
    }

    fn start_sweep(&mut self) {
        self.state = TunerState::Scanning {
            candidate: 0,
            sample: 0,
        };
    }

    fn finish_sweep(&mut self) {
        let best = self
            .samples
            .iter()
            .map(|s| median(s))
            .enumerate()
            .min_by_key(|&(_, m)| m);

        if let Some((index, time)) = best {
            self.selected = self.candidates[index];
            log::debug!(
                "{}: selected {} (median {:?}) from {:?}",
                self.name,
                self.selected,
                time,
                self.candidates
            );
        }
        self.state = TunerState::Idle { launches: 0 };
    }
}

fn median(samples: &[Duration]) -> Duration {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 && mid > 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted.get(mid).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timing(block_size: u32) -> Duration {
        match block_size {
            32 => ms(5),
            64 => ms(2),
            128 => ms(3),
            256 => ms(9),
            _ => ms(100),
        }
    }

    fn tuner(nsamples: usize, period: u32) -> Autotuner {
        Autotuner::new("test", vec![32, 64, 128, 256], nsamples, period).unwrap()
    }

    fn sweep(tuner: &mut Autotuner) {
        for _ in 0..tuner.sweep_len() {
            let value = tuner.begin();
            tuner.end_with(timing(value));
        }
    }

    #[test]
    fn test_selects_fastest_after_sweep() {
        let mut t = tuner(1, 100);
        assert_eq!(t.selected(), 32);
        assert!(t.is_scanning());

        let mut seen = Vec::new();
        for _ in 0..t.sweep_len() {
            let value = t.begin();
            seen.push(value);
            t.end_with(timing(value));
        }
        assert_eq!(seen, vec![32, 64, 128, 256]);
        assert_eq!(t.selected(), 64);
        assert!(!t.is_scanning());
        assert_eq!(t.begin(), 64);
    }

    #[test]
    fn test_disabled_holds_selection() {
        let mut t = tuner(3, 10);
        sweep(&mut t);
        assert_eq!(t.selected(), 64);

        t.set_enabled(false);
        for _ in 0..50 {
            let value = t.begin();
            assert_eq!(value, 64);
            t.end_with(ms(1000));
        }
        assert_eq!(t.selected(), 64);
    }

    #[test]
    fn test_median_rejects_outliers() {
        let mut t = tuner(5, 100);
        let mut round = 0;
        for i in 0..t.sweep_len() {
            let value = t.begin();
            // One pathological sample for 64 and one lucky sample for 256
            let elapsed = match (value, round) {
                (64, 2) => ms(500),
                (256, 4) => ms(0),
                _ => timing(value),
            };
            t.end_with(elapsed);
            if (i + 1) % 4 == 0 {
                round += 1;
            }
        }
        assert_eq!(t.selected(), 64);
    }

    #[test]
    fn test_resweeps_after_period() {
        let mut t = tuner(1, 3);
        sweep(&mut t);
        for _ in 0..3 {
            assert_eq!(t.begin(), 64);
            t.end_with(ms(1));
        }
        assert!(t.is_scanning());
        assert_eq!(t.begin(), 32);
    }

    #[test]
    fn test_rejected_candidate_never_retried() {
        let mut t = tuner(1, 2);
        for _ in 0..4 {
            let value = t.begin();
            if value == 256 {
                t.reject_current().unwrap();
            } else {
                t.end_with(timing(value));
            }
        }
        assert_eq!(t.candidates(), &[32, 64, 128]);
        assert_eq!(t.selected(), 64);

        for _ in 0..40 {
            let value = t.begin();
            assert_ne!(value, 256);
            t.end_with(timing(value));
        }
        assert_eq!(t.selected(), 64);
    }

    #[test]
    fn test_rejecting_everything_is_fatal() {
        let mut t = Autotuner::new("tiny", vec![512, 1024], 1, 10).unwrap();
        t.begin();
        t.reject_current().unwrap();
        t.begin();
        assert_eq!(
            t.reject_current(),
            Err(ComputeError::NoViableLaunchConfig("tiny".to_string()))
        );
    }

    #[test]
    fn test_set_period_does_not_interrupt_sweep() {
        let mut t = tuner(1, 100);
        let first = t.begin();
        t.end_with(timing(first));

        assert_eq!(t.set_period(0), Err(ComputeError::InvalidPeriod));
        t.set_period(1).unwrap();
        assert!(t.is_scanning());
        assert_eq!(t.begin(), 64);
        t.end_with(timing(64));
        for _ in 0..2 {
            let value = t.begin();
            t.end_with(timing(value));
        }
        assert_eq!(t.selected(), 64);

        // Period of one: the next launch ends the idle phase
        assert_eq!(t.begin(), 64);
        t.end_with(ms(1));
        assert!(t.is_scanning());
    }

    #[test]
    fn test_reenabling_starts_fresh_sweep() {
        let mut t = tuner(2, 1000);
        sweep(&mut t);
        assert_eq!(t.selected(), 64);
        assert!(!t.is_scanning());

        // Enabling an enabled tuner changes nothing
        t.set_enabled(true);
        assert!(!t.is_scanning());
        assert_eq!(t.begin(), 64);
        t.end_with(ms(1));

        t.set_enabled(false);
        t.set_enabled(true);
        assert!(t.is_scanning());

        // The new sweep visits every candidate again and can change the pick
        let mut seen = Vec::new();
        for _ in 0..t.sweep_len() {
            let value = t.begin();
            seen.push(value);
            t.end_with(if value == 256 { ms(1) } else { timing(value) });
        }
        assert_eq!(seen, vec![32, 64, 128, 256, 32, 64, 128, 256]);
        assert_eq!(t.selected(), 256);
        assert!(!t.is_scanning());
    }

    #[test]
    fn test_peek_starts_no_timer() {
        let mut t = tuner(1, 100);
        assert_eq!(t.peek(), 32);
        assert_eq!(t.peek(), 32);
        // Nothing in flight, so nothing is recorded
        t.end_with(ms(1));
        assert_eq!(t.peek(), 32);

        assert_eq!(t.begin(), 32);
        t.end_with(timing(32));
        assert_eq!(t.peek(), 64);

        t.reject(64).unwrap();
        assert_eq!(t.peek(), 128);
        assert_eq!(t.begin(), 128);
    }

    #[test]
    fn test_disabled_from_start_uses_default() {
        let mut t = tuner(1, 10).with_default(128);
        t.set_enabled(false);
        for _ in 0..5 {
            assert_eq!(t.begin(), 128);
            t.end();
        }
    }

    #[test]
    fn test_invalid_construction() {
        assert!(Autotuner::new("x", vec![], 1, 1).is_err());
        assert!(Autotuner::new("x", vec![32], 0, 1).is_err());
        assert_eq!(
            Autotuner::new("x", vec![32], 1, 0).unwrap_err(),
            ComputeError::InvalidPeriod
        );
    }
}
