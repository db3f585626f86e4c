/// Mini-game gate: cadence check, tier selection, and guarded completion.
///
/// Mini-games are opaque: the gate only calls `reset` and `start`, and
/// learns the result through a `Completion` handle that posts into a
/// single-threaded outcome mailbox. The engine drains that mailbox on its
/// own turn, so an outcome is never processed in the middle of another
/// routing step.
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

use crate::core::config::TierPolicy;
use crate::core::rng::StoryRng;
use crate::core::session::SessionState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("no mini-games registered")]
    NoGames,
    #[error("no mini-game is pending")]
    NothingPending,
}

/// Narrative tier a mini-game belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Early,
    Middle,
    Late,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Middle => "middle",
            Self::Late => "late",
        }
    }
}

/// Identifies one run of a mini-game. Outcomes carrying any other ticket
/// than the pending one are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateTicket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub ticket: GateTicket,
    pub success: bool,
}

type Mailbox = Rc<RefCell<VecDeque<GateOutcome>>>;

/// One-shot completion handle given to a mini-game on `start`.
///
/// The first `complete` posts the outcome; later calls are no-ops.
/// Dropping an unfinished handle (the game was torn down early) posts
/// a failure.
#[derive(Debug)]
pub struct Completion {
    ticket: GateTicket,
    done: bool,
    mailbox: Mailbox,
}

impl Completion {
    pub fn ticket(&self) -> GateTicket {
        self.ticket
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Report the result. Returns false if this handle already completed.
    pub fn complete(&mut self, success: bool) -> bool {
        if self.done {
            tracing::debug!(ticket = self.ticket.0, "ignoring repeated mini-game completion");
            return false;
        }
        self.done = true;
        self.mailbox.borrow_mut().push_back(GateOutcome {
            ticket: self.ticket,
            success,
        });
        true
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(ticket = self.ticket.0, "mini-game dropped before completing");
            self.complete(false);
        }
    }
}

/// The capability every mini-game exposes to the gate.
pub trait MiniGame {
    fn name(&self) -> &str;
    /// Clear all internal state and cancel pending timers or listeners.
    fn reset(&mut self);
    /// Begin play. The game must eventually call `completion.complete`
    /// (or drop the handle, which counts as a failure).
    fn start(&mut self, completion: Completion);
}

struct GameSlot {
    tier: Tier,
    game: Box<dyn MiniGame>,
}

/// Information about a gate that has just been opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOpened {
    pub ticket: GateTicket,
    pub tier: Tier,
    pub title: String,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    ticket: GateTicket,
    slot: usize,
}

/// What a gate outcome means for the pending transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// Continue to the resolved target. `life_lost` is true after a failure.
    Proceed { life_lost: bool },
    /// The failure took the last life; the resolved target is discarded.
    OutOfLives,
}

pub struct MiniGameGate {
    slots: Vec<GameSlot>,
    enabled: bool,
    cadence: u32,
    policy: TierPolicy,
    round_robin: usize,
    next_ticket: u64,
    pending: Option<Pending>,
    mailbox: Mailbox,
}

impl std::fmt::Debug for MiniGameGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniGameGate")
            .field("games", &self.slots.len())
            .field("enabled", &self.enabled)
            .field("cadence", &self.cadence)
            .field("pending", &self.pending.map(|p| p.ticket))
            .finish()
    }
}

impl MiniGameGate {
    pub fn new(cadence: u32, enabled: bool, policy: TierPolicy) -> Self {
        Self {
            slots: Vec::new(),
            enabled,
            cadence: cadence.max(1),
            policy,
            round_robin: 0,
            next_ticket: 0,
            pending: None,
            mailbox: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn register(&mut self, tier: Tier, game: Box<dyn MiniGame>) {
        self.slots.push(GameSlot { tier, game });
    }

    pub fn game_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_ticket(&self) -> Option<GateTicket> {
        self.pending.map(|p| p.ticket)
    }

    /// True when this choice count falls on the cadence, games are enabled,
    /// at least one game is registered, and the next node is not an ending.
    pub fn should_gate(&self, choices_made: u32, next_is_ending: bool) -> bool {
        self.enabled
            && !self.slots.is_empty()
            && choices_made % self.cadence == 0
            && !next_is_ending
    }

    /// Tier the story flags call for. `None` under round-robin.
    pub fn select_tier(&self, session: &SessionState) -> Option<Tier> {
        match &self.policy {
            TierPolicy::RoundRobin => None,
            TierPolicy::Flags { late, middle } => {
                if late.iter().any(|r| r.matches(session)) {
                    Some(Tier::Late)
                } else if middle.iter().any(|r| r.matches(session)) {
                    Some(Tier::Middle)
                } else {
                    Some(Tier::Early)
                }
            }
        }
    }

    fn choose_slot(&mut self, session: &SessionState, rng: &mut StoryRng) -> Option<usize> {
        if let Some(tier) = self.select_tier(session) {
            let in_tier: Vec<usize> = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.tier == tier)
                .map(|(i, _)| i)
                .collect();
            if let Some(&slot) = rng.pick(&in_tier) {
                return Some(slot);
            }
            tracing::debug!(tier = tier.name(), "no game in tier, cycling instead");
        }
        if self.slots.is_empty() {
            return None;
        }
        let slot = self.round_robin % self.slots.len();
        self.round_robin += 1;
        Some(slot)
    }

    /// Pick a game for the current progress, reset it and start it.
    #[tracing::instrument(skip(self, session, rng))]
    pub fn run_gate(
        &mut self,
        session: &SessionState,
        rng: &mut StoryRng,
    ) -> Result<GateOpened, GateError> {
        self.cancel();
        let slot = self.choose_slot(session, rng).ok_or(GateError::NoGames)?;
        self.next_ticket += 1;
        let ticket = GateTicket(self.next_ticket);
        self.pending = Some(Pending { ticket, slot });

        let entry = &mut self.slots[slot];
        let opened = GateOpened {
            ticket,
            tier: entry.tier,
            title: entry.game.name().to_string(),
        };
        tracing::debug!(ticket = ticket.0, tier = opened.tier.name(), title = %opened.title, "starting mini-game");
        entry.game.reset();
        entry.game.start(Completion {
            ticket,
            done: false,
            mailbox: Rc::clone(&self.mailbox),
        });
        Ok(opened)
    }

    /// Take the outcome of the pending game if it has arrived. Stale
    /// outcomes found on the way are discarded.
    pub fn take_outcome(&mut self) -> Option<GateOutcome> {
        let pending = self.pending?;
        loop {
            let outcome = self.mailbox.borrow_mut().pop_front()?;
            if outcome.ticket == pending.ticket {
                self.pending = None;
                return Some(outcome);
            }
            tracing::debug!(ticket = outcome.ticket.0, "discarding stale mini-game outcome");
        }
    }

    /// Give up on the pending game: reset it and report its ticket so the
    /// caller can settle the transition as a failure.
    pub fn abandon(&mut self) -> Result<GateTicket, GateError> {
        let pending = self.pending.take().ok_or(GateError::NothingPending)?;
        self.slots[pending.slot].game.reset();
        self.mailbox.borrow_mut().clear();
        Ok(pending.ticket)
    }

    /// Tear down any running game and forget queued outcomes.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(ticket = pending.ticket.0, "cancelling running mini-game");
            self.slots[pending.slot].game.reset();
        }
        self.mailbox.borrow_mut().clear();
    }
}

/// Map a gate outcome onto the session's lives.
pub fn settle(session: &mut SessionState, success: bool) -> GateVerdict {
    if success {
        return GateVerdict::Proceed { life_lost: false };
    }
    session.lose_life();
    if session.is_out_of_lives() {
        GateVerdict::OutOfLives
    } else {
        GateVerdict::Proceed { life_lost: true }
    }
}

/// Every `cadence`-th choice restores one life if below the cap.
/// Returns true when a life was restored.
pub fn reward_milestone(session: &mut SessionState, cadence: u32) -> bool {
    let choices = session.choices_made();
    if cadence == 0 || choices == 0 || choices % cadence != 0 {
        return false;
    }
    session.gain_life()
}
