// Team-select phase: both players pick 3 Pokémon from their inventory
// before the battle activates. Picks are validated against the owner's
// inventory; missing picks are auto-filled at the deadline by drawing
// without replacement.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::BattleError;

use super::types::{BattleSlot, ElementType, TEAM_SIZE};

/// One inventory entry as seen by team select. Stats are a snapshot taken
/// at submission/auto-fill time; later inventory edits do not affect a
/// battle in progress.
#[derive(Debug, Clone)]
pub struct OwnedPokemon {
    pub id: i64,
    pub species: String,
    pub element: ElementType,
    pub attack: i32,
    pub max_hp: i32,
    pub is_shiny: bool,
}

/// Per-battle team-select session state. Lives inside the battle's
/// team-select phase and is dropped on activation.
#[derive(Debug, Clone)]
pub struct TeamSelectState {
    pub deadline: DateTime<Utc>,
    /// Validated picks so far, per side. A side is ready once it has
    /// exactly TEAM_SIZE picks; partial submissions are kept for auto-fill.
    pub picks1: Vec<i64>,
    pub picks2: Vec<i64>,
}

impl TeamSelectState {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline,
            picks1: Vec::new(),
            picks2: Vec::new(),
        }
    }

    pub fn both_ready(&self) -> bool {
        self.picks1.len() == TEAM_SIZE && self.picks2.len() == TEAM_SIZE
    }
}

/// Validate a pick list against the owner's inventory. Rejects empty or
/// oversized lists, duplicate selections, and references to Pokémon the
/// player does not own. Replaces any previous picks on success.
pub fn validate_picks(picks: &[i64], inventory: &[OwnedPokemon]) -> Result<(), BattleError> {
    if picks.is_empty() || picks.len() > TEAM_SIZE {
        return Err(BattleError::TeamValidationFailed(format!(
            "expected 1 to {TEAM_SIZE} picks, got {}",
            picks.len()
        )));
    }
    for (i, id) in picks.iter().enumerate() {
        if picks[..i].contains(id) {
            return Err(BattleError::TeamValidationFailed(format!(
                "duplicate pick {id}"
            )));
        }
        if !inventory.iter().any(|p| p.id == *id) {
            return Err(BattleError::TeamValidationFailed(format!(
                "pokemon {id} is not in your inventory"
            )));
        }
    }
    Ok(())
}

/// Complete a pick list up to TEAM_SIZE by drawing randomly, without
/// replacement, from the remaining inventory. Falls back to however many
/// remain if the inventory is too small; an empty result means the side
/// cannot field a team at all.
pub fn auto_fill<R: Rng + ?Sized>(
    picks: &[i64],
    inventory: &[OwnedPokemon],
    rng: &mut R,
) -> Vec<i64> {
    let mut filled: Vec<i64> = picks.to_vec();
    let mut remaining: Vec<i64> = inventory
        .iter()
        .map(|p| p.id)
        .filter(|id| !filled.contains(id))
        .collect();
    remaining.shuffle(rng);
    while filled.len() < TEAM_SIZE {
        match remaining.pop() {
            Some(id) => filled.push(id),
            None => break,
        }
    }
    filled
}

/// Build battle slots from picked inventory ids. HP and attack are copied
/// from the inventory snapshot with `current_hp = max_hp`. Ids not found
/// in the inventory are skipped; callers validate picks beforehand.
pub fn build_team(picks: &[i64], inventory: &[OwnedPokemon]) -> Vec<BattleSlot> {
    picks
        .iter()
        .filter_map(|id| inventory.iter().find(|p| p.id == *id))
        .map(|p| BattleSlot {
            species: p.species.clone(),
            element: p.element,
            is_shiny: p.is_shiny,
            attack: p.attack,
            max_hp: p.max_hp,
            current_hp: p.max_hp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inventory(n: i64) -> Vec<OwnedPokemon> {
        (1..=n)
            .map(|id| OwnedPokemon {
                id,
                species: format!("species-{id}"),
                element: ElementType::Normal,
                attack: 5,
                max_hp: 20,
                is_shiny: false,
            })
            .collect()
    }

    #[test]
    fn test_validate_accepts_full_team() {
        let inv = inventory(5);
        assert!(validate_picks(&[1, 2, 3], &inv).is_ok());
    }

    #[test]
    fn test_validate_accepts_partial_picks() {
        let inv = inventory(5);
        assert!(validate_picks(&[4], &inv).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let inv = inventory(5);
        let err = validate_picks(&[1, 1, 2], &inv).unwrap_err();
        assert_eq!(err.code(), "teamValidationFailed");
    }

    #[test]
    fn test_validate_rejects_foreign_pokemon() {
        let inv = inventory(3);
        let err = validate_picks(&[1, 2, 99], &inv).unwrap_err();
        assert_eq!(err.code(), "teamValidationFailed");
    }

    #[test]
    fn test_validate_rejects_empty_and_oversized() {
        let inv = inventory(5);
        assert!(validate_picks(&[], &inv).is_err());
        assert!(validate_picks(&[1, 2, 3, 4], &inv).is_err());
    }

    #[test]
    fn test_auto_fill_draws_missing_without_replacement() {
        let inv = inventory(5);
        let mut rng = StdRng::seed_from_u64(7);
        let filled = auto_fill(&[2], &inv, &mut rng);
        assert_eq!(filled.len(), TEAM_SIZE);
        assert_eq!(filled[0], 2);
        // All distinct, all from inventory
        for (i, id) in filled.iter().enumerate() {
            assert!(!filled[..i].contains(id));
            assert!(inv.iter().any(|p| p.id == *id));
        }
    }

    #[test]
    fn test_auto_fill_small_inventory_falls_back() {
        let inv = inventory(2);
        let mut rng = StdRng::seed_from_u64(7);
        let filled = auto_fill(&[], &inv, &mut rng);
        assert_eq!(filled.len(), 2);
    }

    #[test]
    fn test_auto_fill_empty_inventory() {
        let inv: Vec<OwnedPokemon> = vec![];
        let mut rng = StdRng::seed_from_u64(7);
        assert!(auto_fill(&[], &inv, &mut rng).is_empty());
    }

    #[test]
    fn test_build_team_snapshots_stats() {
        let inv = inventory(3);
        let team = build_team(&[3, 1], &inv);
        assert_eq!(team.len(), 2);
        assert_eq!(team[0].species, "species-3");
        assert_eq!(team[0].current_hp, team[0].max_hp);
        assert_eq!(team[1].species, "species-1");
    }

    #[test]
    fn test_both_ready() {
        let mut state = TeamSelectState::new(Utc::now() + Duration::seconds(35));
        assert!(!state.both_ready());
        state.picks1 = vec![1, 2, 3];
        assert!(!state.both_ready());
        state.picks2 = vec![4, 5, 6];
        assert!(state.both_ready());
    }
}
