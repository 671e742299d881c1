// Battle domain: types, team select, the turn state machine, and the
// server that runs one task per live battle.

pub mod machine;
pub mod server;
pub mod team_select;
pub mod types;
