// Battle error taxonomy. All variants are recoverable: they are reported
// back to the originating connection and never mutate battle state.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BattleError {
    /// Action submitted by a player who does not currently own the turn,
    /// or while no normal action is legal (e.g. a forced switch is pending).
    #[error("not your turn")]
    NotYourTurn,

    /// Switch or forced-switch targeting a fainted, nonexistent, or
    /// already-active slot.
    #[error("invalid slot selection: {0}")]
    InvalidSlotSelection(String),

    /// Matchmaking join from a player who is already in a live battle.
    #[error("already in a battle")]
    AlreadyInBattle,

    /// Team submission referencing duplicate or out-of-inventory Pokémon.
    /// Resubmission is allowed until the team-select deadline.
    #[error("team validation failed: {0}")]
    TeamValidationFailed(String),

    /// Action referencing a stale or unknown battle id. The client should
    /// re-fetch canonical state.
    #[error("battle not found")]
    BattleNotFound,

    /// Action arrived outside the phase that accepts it (team select still
    /// open, or the battle already ended).
    #[error("battle is not accepting actions")]
    BattleNotActive,

    /// Server-side fault (storage, channel) while handling a request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BattleError {
    /// Stable wire code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            BattleError::NotYourTurn => "notYourTurn",
            BattleError::InvalidSlotSelection(_) => "invalidSlotSelection",
            BattleError::AlreadyInBattle => "alreadyInBattle",
            BattleError::TeamValidationFailed(_) => "teamValidationFailed",
            BattleError::BattleNotFound => "battleNotFound",
            BattleError::BattleNotActive => "battleNotActive",
            BattleError::Internal(_) => "internalError",
        }
    }
}

impl From<sqlx::Error> for BattleError {
    fn from(e: sqlx::Error) -> Self {
        BattleError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(BattleError::NotYourTurn.code(), "notYourTurn");
        assert_eq!(
            BattleError::InvalidSlotSelection("slot 5".into()).code(),
            "invalidSlotSelection"
        );
        assert_eq!(BattleError::AlreadyInBattle.code(), "alreadyInBattle");
        assert_eq!(
            BattleError::TeamValidationFailed("dup".into()).code(),
            "teamValidationFailed"
        );
        assert_eq!(BattleError::BattleNotFound.code(), "battleNotFound");
        assert_eq!(BattleError::BattleNotActive.code(), "battleNotActive");
        assert_eq!(BattleError::Internal("db".into()).code(), "internalError");
    }

    #[test]
    fn test_error_display() {
        let e = BattleError::TeamValidationFailed("duplicate pick".into());
        assert_eq!(e.to_string(), "team validation failed: duplicate pick");
    }
}
