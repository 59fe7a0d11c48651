//! The scheduling engine: qualifier slot claims and bracket reschedules.
//!
//! Operations mutate the in-memory roster and return [`RowDelta`]s for the
//! store adapter to apply; nothing here performs I/O. There is deliberately
//! no locking around the sheet's read-modify-write cycle, matching how the
//! tournament has always been run — see DESIGN.md.

use crate::{
    prelude::*,
    roster::{
        BracketMatch,
        QualifierLobby,
    },
    team::Player,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("lobby {0} was not found")]
    LobbyNotFound(String),
    #[error("lobby {0} is full")]
    FullLobby(String),
    #[error("already scheduled in lobby {0}")]
    SameLobby(String),
    #[error("not a participant of match {0}")]
    NotMatchParticipant(String),
}

/// A pending write against the backing sheet: a row-scoped A1 range
/// (worksheet prefix added by the caller) and the values to put there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowDelta {
    pub(crate) range: String,
    pub(crate) values: Vec<Vec<String>>,
}

/// The sheet columns holding a qualifier lobby's player slots, inclusive on
/// both ends.
pub(crate) struct SlotColumns {
    pub(crate) start: String,
    pub(crate) end: String,
}

fn slot_delta(lobby: &QualifierLobby, slots: &SlotColumns) -> RowDelta {
    let mut row = lobby.players.iter().map(|player| player.team_name.clone()).collect::<Vec<_>>();
    // blank-pad to capacity so a vacated trailing slot is cleared on the sheet
    row.resize(lobby.slot_count, String::default());
    RowDelta {
        range: format!("{start}{sheet_row}:{end}{sheet_row}", start = slots.start, end = slots.end, sheet_row = lobby.lobby.sheet_row),
        values: vec![row],
    }
}

/// Signs `player` up for the lobby with `lobby_id`, moving them out of any
/// lobby they already occupy.
///
/// On success, returns a snapshot of the updated target lobby plus the row
/// deltas to persist; when the player moved, the delta clearing their old
/// slot comes first. Re-claiming the current lobby is rejected as
/// [`Error::SameLobby`] rather than treated as a no-op.
pub(crate) fn claim_slot(lobbies: &mut [QualifierLobby], lobby_id: &str, player: &Player, slots: &SlotColumns) -> Result<(QualifierLobby, Vec<RowDelta>), Error> {
    let target = lobbies.iter().position(|lobby| lobby.lobby.id == lobby_id).ok_or_else(|| Error::LobbyNotFound(lobby_id.to_owned()))?;
    if lobbies[target].players.len() == lobbies[target].slot_count {
        return Err(Error::FullLobby(lobby_id.to_owned()))
    }
    // at most one lobby can contain the player per the roster invariant
    let current = lobbies.iter().position(|lobby| lobby.players.contains(player));
    if current == Some(target) {
        return Err(Error::SameLobby(lobby_id.to_owned()))
    }
    let mut deltas = Vec::with_capacity(2);
    if let Some(current) = current {
        lobbies[current].players.retain(|occupant| occupant != player);
        deltas.push(slot_delta(&lobbies[current], slots));
    }
    lobbies[target].players.push(player.clone());
    deltas.push(slot_delta(&lobbies[target], slots));
    Ok((lobbies[target].clone(), deltas))
}

/// Checks that `player` may reschedule the match with `match_id`.
pub(crate) fn validate_reschedule<'a>(matches: &'a [BracketMatch], match_id: &str, player: &Player) -> Result<&'a BracketMatch, Error> {
    let found = matches.iter().find(|m| m.lobby.id == match_id).ok_or_else(|| Error::LobbyNotFound(match_id.to_owned()))?;
    if found.player1.as_ref() != Some(player) && found.player2.as_ref() != Some(player) {
        return Err(Error::NotMatchParticipant(match_id.to_owned()))
    }
    Ok(found)
}

/// Produces the deltas that move an approved reschedule onto the sheet: the
/// date cell as e.g. `Sat Aug 19` and the time cell as 24-hour `HH:MM`.
///
/// The in-memory match keeps its old `time`; callers reload the roster
/// rather than patching the stale record.
pub(crate) fn apply_reschedule(found: &BracketMatch, new_time: DateTime<Utc>, date_col: &str, time_col: &str) -> Vec<RowDelta> {
    let sheet_row = found.lobby.sheet_row;
    vec![
        RowDelta {
            range: format!("{date_col}{sheet_row}:{date_col}{sheet_row}"),
            values: vec![vec![new_time.format("%a %b %d").to_string()]],
        },
        RowDelta {
            range: format!("{time_col}{sheet_row}:{time_col}{sheet_row}"),
            values: vec![vec![new_time.format("%H:%M").to_string()]],
        },
    ]
}
