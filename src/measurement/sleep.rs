//! Focus-mode inactivity countdown. A blink restarts it from the full budget.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTick {
    Counting(u64),
    /// The countdown just reached zero on this tick.
    FellAsleep,
    AlreadyAsleep,
}

/// Advance the countdown by one second.
pub fn tick(remaining: &mut u64, is_sleep: &mut bool) -> SleepTick {
    if *is_sleep {
        return SleepTick::AlreadyAsleep;
    }

    *remaining = remaining.saturating_sub(1);
    if *remaining == 0 {
        *is_sleep = true;
        SleepTick::FellAsleep
    } else {
        SleepTick::Counting(*remaining)
    }
}

pub fn reset(remaining: &mut u64, is_sleep: &mut bool, budget_secs: u64) {
    *remaining = budget_secs;
    *is_sleep = false;
}
