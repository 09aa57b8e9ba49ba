// src/capture/trigger.rs
use crate::error::{WaveLogError, Result};
use crate::instrument::{scpi, Instrument};
use crate::types::TriggerStatus;
use log::debug;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Time source for bounded polling loops
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`std::thread::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
    sleeps: Cell<u64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Simulated time since construction
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn sleep_count(&self) -> u64 {
        self.sleeps.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Trigger wait limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Give up after this long without reaching STOP or WAIT
    pub threshold: Duration,
    /// Pause between status polls
    pub cooldown: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            threshold: Duration::from_secs(10),
            cooldown: Duration::from_millis(5),
        }
    }
}

/// How the acquisition completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Instrument reported STOP on its own
    Stopped,
    /// Instrument reported WAIT and a force-trigger was issued
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerReport {
    pub outcome: TriggerOutcome,
    pub polls: u32,
    pub waited: Duration,
}

/// Poll the trigger state until the acquisition is complete.
///
/// Must be called right after the single-acquisition command. STOP returns
/// immediately; WAIT issues `:TFOR` and returns; anything else sleeps one
/// cooldown and polls again until `threshold` elapses.
pub fn wait_for_trigger<I, C>(instrument: &mut I, clock: &C, config: &TriggerConfig) -> Result<TriggerReport>
where
    I: Instrument + ?Sized,
    C: Clock + ?Sized,
{
    let started = clock.now();
    let deadline = started + config.threshold;
    let mut polls = 0u32;

    while clock.now() < deadline {
        polls += 1;
        match instrument.trigger_status()? {
            TriggerStatus::Stopped => {
                let waited = clock.now().duration_since(started);
                debug!("Trigger stopped after {:?} ({} polls)", waited, polls);
                return Ok(TriggerReport { outcome: TriggerOutcome::Stopped, polls, waited });
            }
            TriggerStatus::Waiting => {
                instrument.write(scpi::FORCE_TRIGGER)?;
                let waited = clock.now().duration_since(started);
                debug!("Force triggered after {:?} ({} polls)", waited, polls);
                return Ok(TriggerReport { outcome: TriggerOutcome::Forced, polls, waited });
            }
            TriggerStatus::Running => clock.sleep(config.cooldown),
        }
    }

    Err(WaveLogError::TriggerTimeout { threshold: config.threshold })
}
