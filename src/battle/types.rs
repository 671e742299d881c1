// Battle domain types: sides, element matchups, team slots, outcomes.

use serde::{Deserialize, Serialize};

/// Fixed team size once a battle starts.
pub const TEAM_SIZE: usize = 3;

/// The two seats in a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSide {
    Player1,
    Player2,
}

impl PlayerSide {
    pub fn opponent(self) -> Self {
        match self {
            PlayerSide::Player1 => PlayerSide::Player2,
            PlayerSide::Player2 => PlayerSide::Player1,
        }
    }
}

/// Element types. The favorable cycle is grass over fire, fire over water,
/// water over grass; the reverse direction is unfavorable. Normal has no
/// advantage or disadvantage in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Fire,
    Water,
    Grass,
    Normal,
}

impl ElementType {
    /// Damage multiplier for an attack of this element against `defender`:
    /// 1.5 favorable, 0.75 unfavorable, 1.0 otherwise.
    pub fn multiplier_against(self, defender: ElementType) -> f64 {
        use ElementType::*;
        match (self, defender) {
            (Grass, Fire) | (Fire, Water) | (Water, Grass) => 1.5,
            (Fire, Grass) | (Water, Fire) | (Grass, Water) => 0.75,
            _ => 1.0,
        }
    }

    /// Parse a stored element name. Unknown strings map to Normal so a
    /// malformed inventory row degrades instead of wedging a battle.
    pub fn from_name(s: &str) -> Self {
        match s {
            "fire" => ElementType::Fire,
            "water" => ElementType::Water,
            "grass" => ElementType::Grass,
            _ => ElementType::Normal,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Fire => "fire",
            ElementType::Water => "water",
            ElementType::Grass => "grass",
            ElementType::Normal => "normal",
        }
    }
}

/// Damage dealt by one attack: floor(attack * matchup multiplier).
pub fn attack_damage(attack: i32, attacker: ElementType, defender: ElementType) -> i32 {
    ((attack as f64) * attacker.multiplier_against(defender)).floor() as i32
}

/// One Pokémon in a battle team. `current_hp` starts at `max_hp` and only
/// decreases for the life of the battle, clamped at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSlot {
    pub species: String,
    pub element: ElementType,
    pub is_shiny: bool,
    pub attack: i32,
    pub max_hp: i32,
    pub current_hp: i32,
}

impl BattleSlot {
    pub fn is_fainted(&self) -> bool {
        self.current_hp <= 0
    }

    /// Apply damage, clamping `current_hp` at 0.
    pub fn take_damage(&mut self, amount: i32) {
        self.current_hp = (self.current_hp - amount).max(0);
    }
}

/// Who won a finished battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Player1,
    Player2,
    Draw,
}

impl Winner {
    pub fn from_side(side: PlayerSide) -> Self {
        match side {
            PlayerSide::Player1 => Winner::Player1,
            PlayerSide::Player2 => Winner::Player2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Winner::Player1 => "player1",
            Winner::Player2 => "player2",
            Winner::Draw => "draw",
        }
    }
}

/// Why a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Ko,
    Surrender,
    Timeout,
    Disconnect,
}

impl EndReason {
    pub fn name(self) -> &'static str {
        match self {
            EndReason::Ko => "ko",
            EndReason::Surrender => "surrender",
            EndReason::Timeout => "timeout",
            EndReason::Disconnect => "disconnect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent() {
        assert_eq!(PlayerSide::Player1.opponent(), PlayerSide::Player2);
        assert_eq!(PlayerSide::Player2.opponent(), PlayerSide::Player1);
    }

    #[test]
    fn test_matchup_cycle() {
        use ElementType::*;
        // Favorable direction
        assert_eq!(Grass.multiplier_against(Fire), 1.5);
        assert_eq!(Fire.multiplier_against(Water), 1.5);
        assert_eq!(Water.multiplier_against(Grass), 1.5);
        // Unfavorable direction
        assert_eq!(Fire.multiplier_against(Grass), 0.75);
        assert_eq!(Water.multiplier_against(Fire), 0.75);
        assert_eq!(Grass.multiplier_against(Water), 0.75);
        // Same element is neutral
        assert_eq!(Fire.multiplier_against(Fire), 1.0);
    }

    #[test]
    fn test_normal_is_always_neutral() {
        use ElementType::*;
        for other in [Fire, Water, Grass, Normal] {
            assert_eq!(Normal.multiplier_against(other), 1.0);
            assert_eq!(other.multiplier_against(Normal), 1.0);
        }
    }

    #[test]
    fn test_damage_determinism() {
        use ElementType::*;
        // Fire attacking grass is defender-favorable: floor(6 * 0.75) = 4
        assert_eq!(attack_damage(6, Fire, Grass), 4);
        // Grass attacking fire is attacker-favorable: floor(6 * 1.5) = 9
        assert_eq!(attack_damage(6, Grass, Fire), 9);
        // Neutral
        assert_eq!(attack_damage(6, Normal, Fire), 6);
    }

    #[test]
    fn test_damage_floors() {
        use ElementType::*;
        // floor(5 * 1.5) = 7, floor(5 * 0.75) = 3
        assert_eq!(attack_damage(5, Grass, Fire), 7);
        assert_eq!(attack_damage(5, Fire, Grass), 3);
    }

    #[test]
    fn test_slot_damage_clamps_at_zero() {
        let mut slot = BattleSlot {
            species: "bulbasaur".into(),
            element: ElementType::Grass,
            is_shiny: false,
            attack: 4,
            max_hp: 10,
            current_hp: 10,
        };
        slot.take_damage(6);
        assert_eq!(slot.current_hp, 4);
        assert!(!slot.is_fainted());
        slot.take_damage(100);
        assert_eq!(slot.current_hp, 0);
        assert!(slot.is_fainted());
    }

    #[test]
    fn test_element_name_round_trip() {
        for e in [
            ElementType::Fire,
            ElementType::Water,
            ElementType::Grass,
            ElementType::Normal,
        ] {
            assert_eq!(ElementType::from_name(e.name()), e);
        }
        // Unknown names degrade to Normal
        assert_eq!(ElementType::from_name("dragon"), ElementType::Normal);
    }
}
