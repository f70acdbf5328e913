use std::{ops::Add, time::Duration};

/// Simulation clock. Advances by one on every scheduler step; all cooldowns
/// are measured against it so identical inputs give identical outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickDuration(u64);

impl Tick {
    pub fn zero() -> Tick {
        Tick(0)
    }

    pub fn increase(&self) -> Tick {
        Tick(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, saturating at zero when `earlier` is in the future.
    pub fn since(&self, earlier: Tick) -> TickDuration {
        TickDuration(self.0.saturating_sub(earlier.0))
    }
}

impl TickDuration {
    pub fn from_ticks(ticks: u64) -> TickDuration {
        TickDuration(ticks)
    }

    /// Rounds up, so a non-zero cooldown never collapses to zero ticks.
    pub fn from_millis(millis: u64, tick_period: Duration) -> TickDuration {
        let period = tick_period.as_millis().max(1) as u64;
        TickDuration((millis + period - 1) / period)
    }

    pub fn ticks(&self) -> u64 {
        self.0
    }
}

impl Add<TickDuration> for Tick {
    type Output = Tick;

    fn add(self, rhs: TickDuration) -> Self::Output {
        Tick(self.0 + rhs.0)
    }
}
