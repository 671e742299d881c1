// The authoritative battle state machine. A battle moves through an
// explicit tagged phase (team select -> active -> ended); actions are
// fully validated before any mutation so a rejected or failed transition
// leaves the prior state intact.
//
// Turn flow: the owner attacks or switches, then ownership passes to the
// opponent. A fainting attack instead puts the defender into a pending
// forced switch: the defender stays the formal owner (their clock runs)
// but the only action accepted from them is the forced switch, and
// completing it hands ownership to the attacker — the attack consumed the
// defender's response, so the replacement itself is not a turn.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BattleError;

use super::team_select::TeamSelectState;
use super::types::{attack_damage, BattleSlot, EndReason, PlayerSide, Winner};

/// An inbound player action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Attack,
    Switch { slot: usize },
    #[serde(rename = "forced-switch")]
    ForcedSwitch { slot: usize },
    Surrender,
}

/// Battle phase as an explicit tagged union; never inferred from which
/// fields happen to be populated.
#[derive(Debug, Clone)]
pub enum Phase {
    TeamSelect(TeamSelectState),
    Active(ActiveState),
    Ended(EndedState),
}

/// State of a battle whose teams are locked in and whose turns are running.
#[derive(Debug, Clone)]
pub struct ActiveState {
    pub team1: Vec<BattleSlot>,
    pub team2: Vec<BattleSlot>,
    pub active1: usize,
    pub active2: usize,
    pub turn_owner: PlayerSide,
    /// The owner's active slot fainted and must be replaced via a forced
    /// switch before normal turn flow resumes.
    pub pending_switch: bool,
    pub turn_started1: DateTime<Utc>,
    pub turn_started2: DateTime<Utc>,
}

/// Terminal state. The record becomes read-only history once reached.
#[derive(Debug, Clone)]
pub struct EndedState {
    pub winner: Winner,
    pub reason: EndReason,
    pub ended_at: DateTime<Utc>,
    pub team1: Vec<BattleSlot>,
    pub team2: Vec<BattleSlot>,
}

/// One battle record, exclusively owned by its battle task for the
/// duration of its active lifetime.
#[derive(Debug, Clone)]
pub struct Battle {
    pub id: Uuid,
    pub player1: i64,
    pub player2: i64,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
}

impl Battle {
    /// Open a new battle in the team-select phase.
    pub fn new(
        id: Uuid,
        player1: i64,
        player2: i64,
        created_at: DateTime<Utc>,
        select_deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            player1,
            player2,
            created_at,
            phase: Phase::TeamSelect(TeamSelectState::new(select_deadline)),
        }
    }

    pub fn side_of(&self, player_id: i64) -> Option<PlayerSide> {
        if player_id == self.player1 {
            Some(PlayerSide::Player1)
        } else if player_id == self.player2 {
            Some(PlayerSide::Player2)
        } else {
            None
        }
    }

    pub fn player_id(&self, side: PlayerSide) -> i64 {
        match side {
            PlayerSide::Player1 => self.player1,
            PlayerSide::Player2 => self.player2,
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, Phase::Ended(_))
    }

    /// Lock in both teams and start turn flow: actives at slot 0, player 1
    /// owns the first turn, both turn clocks stamped.
    pub fn activate(&mut self, team1: Vec<BattleSlot>, team2: Vec<BattleSlot>, now: DateTime<Utc>) {
        self.phase = Phase::Active(ActiveState {
            team1,
            team2,
            active1: 0,
            active2: 0,
            turn_owner: PlayerSide::Player1,
            pending_switch: false,
            turn_started1: now,
            turn_started2: now,
        });
    }

    /// Apply a player action. Returns `Ok(true)` if the action ended the
    /// battle. Rejections leave the state untouched.
    pub fn apply_action(
        &mut self,
        actor: PlayerSide,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<bool, BattleError> {
        let outcome = match &mut self.phase {
            Phase::TeamSelect(_) | Phase::Ended(_) => return Err(BattleError::BattleNotActive),
            Phase::Active(state) => state.apply_action(actor, action, now)?,
        };
        match outcome {
            Some((winner, reason)) => {
                self.end(winner, reason, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check the current owner's turn clock against the budget. The check
    /// reads the live owner and stamp, so a deadline scheduled against a
    /// turn that has since moved is a no-op. Returns true if the battle
    /// ended by timeout.
    pub fn check_turn_timeout(&mut self, budget: Duration, now: DateTime<Utc>) -> bool {
        let expired = match &self.phase {
            Phase::Active(state) => state.turn_timeout(budget, now),
            _ => None,
        };
        match expired {
            Some((winner, reason)) => {
                self.end(winner, reason, now);
                true
            }
            None => false,
        }
    }

    /// Force a terminal transition (timeout sweep, disconnect grace expiry,
    /// team-select default loss, internal fault fallback).
    pub fn end(&mut self, winner: Winner, reason: EndReason, now: DateTime<Utc>) {
        let ended = EndedState {
            winner,
            reason,
            ended_at: now,
            team1: Vec::new(),
            team2: Vec::new(),
        };
        let prior = std::mem::replace(&mut self.phase, Phase::Ended(ended));
        if let Phase::Active(state) = prior {
            if let Phase::Ended(e) = &mut self.phase {
                e.team1 = state.team1;
                e.team2 = state.team2;
            }
        }
    }

    /// A consistent public view of the record, taken immediately after a
    /// transition within the same logical step.
    pub fn snapshot(&self) -> BattleSnapshot {
        let mut snap = BattleSnapshot {
            battle_id: self.id,
            player1_id: self.player1,
            player2_id: self.player2,
            phase: "team_select",
            select_deadline: None,
            team1: Vec::new(),
            team2: Vec::new(),
            active1: None,
            active2: None,
            turn_owner: None,
            pending_switch: false,
            winner: None,
            reason: None,
            ended_at: None,
        };
        match &self.phase {
            Phase::TeamSelect(select) => {
                snap.select_deadline = Some(select.deadline);
            }
            Phase::Active(state) => {
                snap.phase = "active";
                snap.team1 = state.team1.clone();
                snap.team2 = state.team2.clone();
                snap.active1 = Some(state.active1);
                snap.active2 = Some(state.active2);
                snap.turn_owner = Some(state.turn_owner);
                snap.pending_switch = state.pending_switch;
            }
            Phase::Ended(state) => {
                snap.phase = "ended";
                snap.team1 = state.team1.clone();
                snap.team2 = state.team2.clone();
                snap.winner = Some(state.winner);
                snap.reason = Some(state.reason);
                snap.ended_at = Some(state.ended_at);
            }
        }
        snap
    }
}

impl ActiveState {
    fn team(&self, side: PlayerSide) -> &[BattleSlot] {
        match side {
            PlayerSide::Player1 => &self.team1,
            PlayerSide::Player2 => &self.team2,
        }
    }

    fn active_index(&self, side: PlayerSide) -> usize {
        match side {
            PlayerSide::Player1 => self.active1,
            PlayerSide::Player2 => self.active2,
        }
    }

    pub fn active_slot(&self, side: PlayerSide) -> &BattleSlot {
        &self.team(side)[self.active_index(side)]
    }

    fn set_active(&mut self, side: PlayerSide, slot: usize) {
        match side {
            PlayerSide::Player1 => self.active1 = slot,
            PlayerSide::Player2 => self.active2 = slot,
        }
    }

    fn has_living(&self, side: PlayerSide) -> bool {
        self.team(side).iter().any(|s| !s.is_fainted())
    }

    fn turn_started(&self, side: PlayerSide) -> DateTime<Utc> {
        match side {
            PlayerSide::Player1 => self.turn_started1,
            PlayerSide::Player2 => self.turn_started2,
        }
    }

    fn give_turn(&mut self, side: PlayerSide, now: DateTime<Utc>) {
        self.turn_owner = side;
        match side {
            PlayerSide::Player1 => self.turn_started1 = now,
            PlayerSide::Player2 => self.turn_started2 = now,
        }
    }

    fn require_normal_turn(&self, actor: PlayerSide) -> Result<(), BattleError> {
        if self.pending_switch || self.turn_owner != actor {
            return Err(BattleError::NotYourTurn);
        }
        Ok(())
    }

    fn validate_switch_target(&self, side: PlayerSide, slot: usize) -> Result<(), BattleError> {
        let team = self.team(side);
        if slot >= team.len() {
            return Err(BattleError::InvalidSlotSelection(format!(
                "no slot {slot}"
            )));
        }
        if slot == self.active_index(side) {
            return Err(BattleError::InvalidSlotSelection(format!(
                "slot {slot} is already active"
            )));
        }
        if team[slot].is_fainted() {
            return Err(BattleError::InvalidSlotSelection(format!(
                "slot {slot} is fainted"
            )));
        }
        Ok(())
    }

    /// Apply one action, fully validating before mutating anything.
    pub fn apply_action(
        &mut self,
        actor: PlayerSide,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Option<(Winner, EndReason)>, BattleError> {
        match action {
            Action::Surrender => Ok(Some((
                Winner::from_side(actor.opponent()),
                EndReason::Surrender,
            ))),
            Action::ForcedSwitch { slot } => {
                if !self.active_slot(actor).is_fainted() {
                    return Err(BattleError::InvalidSlotSelection(
                        "active slot is not fainted".into(),
                    ));
                }
                self.validate_switch_target(actor, slot)?;
                self.set_active(actor, slot);
                if self.pending_switch && self.turn_owner == actor {
                    // Deferred hand-off from the fainting attack.
                    self.pending_switch = false;
                    self.give_turn(actor.opponent(), now);
                }
                Ok(None)
            }
            Action::Attack => {
                self.require_normal_turn(actor)?;
                let defender = actor.opponent();
                let damage = attack_damage(
                    self.active_slot(actor).attack,
                    self.active_slot(actor).element,
                    self.active_slot(defender).element,
                );
                let def_index = self.active_index(defender);
                let slot = match defender {
                    PlayerSide::Player1 => &mut self.team1[def_index],
                    PlayerSide::Player2 => &mut self.team2[def_index],
                };
                slot.take_damage(damage);
                if slot.is_fainted() {
                    if !self.has_living(defender) {
                        return Ok(Some((Winner::from_side(actor), EndReason::Ko)));
                    }
                    // Defender must pick a replacement before flow resumes;
                    // their clock runs while they decide.
                    self.pending_switch = true;
                    self.give_turn(defender, now);
                } else {
                    self.give_turn(defender, now);
                }
                Ok(None)
            }
            Action::Switch { slot } => {
                self.require_normal_turn(actor)?;
                self.validate_switch_target(actor, slot)?;
                self.set_active(actor, slot);
                self.give_turn(actor.opponent(), now);
                Ok(None)
            }
        }
    }

    /// Timeout check against the current owner's clock.
    pub fn turn_timeout(&self, budget: Duration, now: DateTime<Utc>) -> Option<(Winner, EndReason)> {
        if now - self.turn_started(self.turn_owner) > budget {
            Some((
                Winner::from_side(self.turn_owner.opponent()),
                EndReason::Timeout,
            ))
        } else {
            None
        }
    }
}

/// Serializable view of a battle broadcast to participants and spectators.
#[derive(Debug, Clone, Serialize)]
pub struct BattleSnapshot {
    pub battle_id: Uuid,
    pub player1_id: i64,
    pub player2_id: i64,
    pub phase: &'static str,
    pub select_deadline: Option<DateTime<Utc>>,
    pub team1: Vec<BattleSlot>,
    pub team2: Vec<BattleSlot>,
    pub active1: Option<usize>,
    pub active2: Option<usize>,
    pub turn_owner: Option<PlayerSide>,
    pub pending_switch: bool,
    pub winner: Option<Winner>,
    pub reason: Option<EndReason>,
    pub ended_at: Option<DateTime<Utc>>,
}
