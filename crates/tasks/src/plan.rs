//! Stage transitions, kept free of locks and scheduling so they can be
//! checked on their own.

use std::time::Duration;

/// Where a destruction sequence is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Play the destruction effect; dispose of throwaway ships right away.
    Initiate,
    /// Move the hull next to a station and send the crew after it.
    Relocate,
    /// Only reached by an external re-invocation. Carries the raw stage number (≥ 2).
    Finalize(u32),
}

impl Stage {
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => Stage::Initiate,
            1 => Stage::Relocate,
            n => Stage::Finalize(n),
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Stage::Initiate => 0,
            Stage::Relocate => 1,
            Stage::Finalize(n) => n,
        }
    }

    pub fn next(self) -> Self {
        Stage::from_index(self.index().saturating_add(1))
    }
}

/// What a stage needs to know about the ship to choose its branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipFacts {
    pub has_owner: bool,
    pub persistence_level: u8,
}

impl ShipFacts {
    /// No owner and nothing durable: nobody will miss it.
    pub fn is_disposable(self) -> bool {
        !self.has_owner && self.persistence_level == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Destruction effect, then either destroy now or mark the ship as destroying.
    Initiate { destroy_now: bool },
    Relocate,
    StoreInDevice,
    Destroy,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reschedule {
    pub stage: Stage,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub next: Option<Reschedule>,
}

impl Step {
    fn terminal(action: Action) -> Self {
        Self { action, next: None }
    }
}

pub fn plan(stage: Stage, facts: ShipFacts, relocate_delay: Duration) -> Step {
    match stage {
        Stage::Initiate if facts.is_disposable() => {
            Step::terminal(Action::Initiate { destroy_now: true })
        }
        Stage::Initiate => Step {
            action: Action::Initiate { destroy_now: false },
            next: Some(Reschedule {
                stage: Stage::Relocate,
                delay: relocate_delay,
            }),
        },
        Stage::Relocate => Step::terminal(Action::Relocate),
        Stage::Finalize(_) if facts.has_owner => Step::terminal(Action::StoreInDevice),
        Stage::Finalize(_) if facts.persistence_level == 0 => Step::terminal(Action::Destroy),
        Stage::Finalize(_) => Step::terminal(Action::Nothing),
    }
}
