use std::fmt;

/// Lifecycle of a round as one client sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Not unlocked yet. Only an admin action leaves this phase.
    Locked,
    /// Unlocked, timer not started (or the round record is missing or inconsistent).
    Waiting,
    Running,
    /// Derived locally from elapsed time; never waits for the stored flag to flip.
    Ended,
}

impl RoundPhase {
    pub fn is_blocking(&self) -> bool {
        !matches!(self, RoundPhase::Running)
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundPhase::Locked => "locked",
            RoundPhase::Waiting => "waiting",
            RoundPhase::Running => "running",
            RoundPhase::Ended => "ended",
        };
        f.write_str(label)
    }
}
