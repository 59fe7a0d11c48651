//! Decoding sheet rows into typed lobby and match records.
//!
//! A roster is loaded fresh from the spreadsheet at the start of every
//! scheduling operation, mutated in memory, and discarded after the row
//! deltas are written back. Nothing here caches across commands.

use crate::{
    prelude::*,
    sheets::SheetRow,
    team::{
        Player,
        PlayerDirectory,
        Referee,
        RefereeDirectory,
    },
};

/// Sheets serial dates count days from this date, with time of day as the
/// fractional part.
const SERIAL_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1899, 12, 30) {
    Some(date) => date,
    None => unreachable!(),
};

/// Fields shared by qualifier lobbies and bracket matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lobby {
    /// Lobby/match ID as it appears on the sheet, e.g. `A1`. Matching is
    /// done on the upper-cased form; the command layer normalizes input.
    pub(crate) id: String,
    pub(crate) time: DateTime<Utc>,
    pub(crate) referee: Option<Referee>,
    /// 1-based sheet row this record was decoded from, used to address
    /// write-backs.
    pub(crate) sheet_row: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QualifierLobby {
    pub(crate) lobby: Lobby,
    /// Signup order, which is also the slot order written back to the sheet.
    pub(crate) players: Vec<Player>,
    pub(crate) slot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BracketMatch {
    pub(crate) lobby: Lobby,
    /// `None` if the sheet cell didn't resolve against the player directory.
    /// An unresolved slot never matches a reschedule requester.
    pub(crate) player1: Option<Player>,
    pub(crate) player2: Option<Player>,
}

/// Column offsets within a qualifier row: `id, date, time, ref` followed by
/// a contiguous block of player slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QualifierLayout {
    pub(crate) id: usize,
    pub(crate) date: usize,
    pub(crate) time: usize,
    pub(crate) referee: usize,
    pub(crate) players_start: usize,
    pub(crate) players_end: usize,
}

impl QualifierLayout {
    pub(crate) fn new(slot_count: usize) -> Self {
        Self {
            id: 0,
            date: 1,
            time: 2,
            referee: 3,
            players_start: 4,
            players_end: 4 + slot_count - 1,
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.players_end - self.players_start + 1
    }
}

/// Column offsets within a bracket match row: `id, date, time, ref`, one
/// spacer column, then the two participants.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MatchLayout {
    pub(crate) id: usize,
    pub(crate) date: usize,
    pub(crate) time: usize,
    pub(crate) referee: usize,
    pub(crate) player1: usize,
    pub(crate) player2: usize,
}

impl Default for MatchLayout {
    fn default() -> Self {
        Self {
            id: 0,
            date: 1,
            time: 2,
            referee: 3,
            player1: 5,
            player2: 6,
        }
    }
}

/// Combines a serial date and a fractional-day time into a UTC timestamp.
///
/// Unparseable serials degrade to the Unix epoch instead of failing the
/// whole roster load; a lobby with a visibly wrong time is more useful than
/// no roster at all.
pub(crate) fn serial_to_datetime(date: Option<f64>, time: Option<f64>) -> DateTime<Utc> {
    fn decode(days: f64) -> Option<DateTime<Utc>> {
        if !days.is_finite() { return None }
        let millis = (days * 86_400_000.0).round();
        if millis < i64::MIN as f64 || millis > i64::MAX as f64 { return None }
        SERIAL_EPOCH.and_hms_opt(0, 0, 0)?.and_utc().checked_add_signed(chrono::TimeDelta::try_milliseconds(millis as i64)?)
    }

    match (date, time) {
        (Some(date), Some(time)) => decode(date + time).unwrap_or(DateTime::UNIX_EPOCH),
        _ => DateTime::UNIX_EPOCH,
    }
}

fn row_is_empty(row: &SheetRow) -> bool {
    row.cells.iter().all(|cell| cell.is_empty())
}

fn cell<'a>(row: &'a SheetRow, idx: usize) -> &'a str {
    row.cells.get(idx).map(String::as_str).unwrap_or_default()
}

fn referee_for(row: &SheetRow, idx: usize, referees: &RefereeDirectory) -> Option<Referee> {
    let name = cell(row, idx);
    if name.is_empty() { return None }
    referees.by_osu_name(name)
}

/// Decodes the qualifier table. Entirely blank rows are skipped, player
/// cells that don't resolve against the directory are omitted from the
/// lobby, and row order is preserved.
pub(crate) fn load_qualifiers(rows: &[SheetRow], layout: &QualifierLayout, players: &PlayerDirectory, referees: &RefereeDirectory) -> Vec<QualifierLobby> {
    rows.iter()
        .filter(|row| !row_is_empty(row))
        .map(|row| QualifierLobby {
            lobby: Lobby {
                id: cell(row, layout.id).to_owned(),
                time: serial_to_datetime(row.date_serial, row.time_serial),
                referee: referee_for(row, layout.referee, referees),
                sheet_row: row.row,
            },
            players: (layout.players_start..=layout.players_end)
                .filter_map(|idx| players.by_team_name(cell(row, idx)))
                .collect(),
            slot_count: layout.slot_count(),
        })
        .collect()
}

/// Decodes the bracket match table, same skipping rules as
/// [`load_qualifiers`].
pub(crate) fn load_matches(rows: &[SheetRow], layout: &MatchLayout, players: &PlayerDirectory, referees: &RefereeDirectory) -> Vec<BracketMatch> {
    rows.iter()
        .filter(|row| !row_is_empty(row))
        .map(|row| BracketMatch {
            lobby: Lobby {
                id: cell(row, layout.id).to_owned(),
                time: serial_to_datetime(row.date_serial, row.time_serial),
                referee: referee_for(row, layout.referee, referees),
                sheet_row: row.row,
            },
            player1: players.by_team_name(cell(row, layout.player1)),
            player2: players.by_team_name(cell(row, layout.player2)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYERS_CSV: &str = "\
Team Name,Captain osu! Username,Captain Discord Username
Cool Cats,whiskers,whiskers#0
Sharp Shooters,deadeye,deadeye#0
";

    const REFEREES_CSV: &str = "\
osu! Username,Discord Username
zebra,zebra#0
";

    fn players() -> PlayerDirectory {
        PlayerDirectory::from_reader(PLAYERS_CSV.as_bytes()).unwrap()
    }

    fn referees() -> RefereeDirectory {
        RefereeDirectory::from_reader(REFEREES_CSV.as_bytes()).unwrap()
    }

    fn row(sheet_row: u32, cells: &[&str], date_serial: Option<f64>, time_serial: Option<f64>) -> SheetRow {
        SheetRow {
            row: sheet_row,
            cells: cells.iter().map(|cell| (*cell).to_owned()).collect(),
            date_serial,
            time_serial,
        }
    }

    fn datetime_to_serial(time: DateTime<Utc>) -> (f64, f64) {
        let days = (time.date_naive() - SERIAL_EPOCH).num_days() as f64;
        let fraction = f64::from(time.num_seconds_from_midnight()) / 86_400.0;
        (days, fraction)
    }

    #[test]
    fn serial_round_trip_preserves_the_minute() {
        let original = Utc.with_ymd_and_hms(2023, 8, 19, 18, 30, 0).unwrap();
        let (date, fraction) = datetime_to_serial(original);
        assert_eq!(serial_to_datetime(Some(date), Some(fraction)), original);
    }

    #[test]
    fn bad_serials_degrade_to_the_epoch_sentinel() {
        assert_eq!(serial_to_datetime(None, Some(0.5)), DateTime::UNIX_EPOCH);
        assert_eq!(serial_to_datetime(Some(f64::NAN), Some(0.5)), DateTime::UNIX_EPOCH);
        assert_eq!(serial_to_datetime(Some(f64::MAX), Some(0.0)), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn blank_rows_are_skipped_and_order_preserved() {
        let layout = QualifierLayout::new(2);
        let rows = [
            row(5, &["A1", "Sat Aug 19", "18:30", "", "Cool Cats", ""], Some(45157.0), Some(0.75)),
            row(6, &["", "", "", "", "", ""], None, None),
            row(7, &["A2", "Sun Aug 20", "20:00", "zebra", "", ""], Some(45158.0), Some(0.5)),
        ];
        let lobbies = load_qualifiers(&rows, &layout, &players(), &referees());
        assert_eq!(lobbies.len(), 2);
        assert_eq!(lobbies[0].lobby.id, "A1");
        assert_eq!(lobbies[0].lobby.sheet_row, 5);
        assert_eq!(lobbies[1].lobby.id, "A2");
        assert_eq!(lobbies[1].lobby.sheet_row, 7);
    }

    #[test]
    fn unresolved_player_cells_are_omitted() {
        let layout = QualifierLayout::new(3);
        let rows = [
            row(5, &["A1", "", "", "", "Cool Cats", "No Such Team", "Sharp Shooters"], Some(45157.0), Some(0.75)),
        ];
        let lobbies = load_qualifiers(&rows, &layout, &players(), &referees());
        assert_eq!(lobbies[0].players.len(), 2);
        assert_eq!(lobbies[0].players[0].team_name, "Cool Cats");
        assert_eq!(lobbies[0].players[1].team_name, "Sharp Shooters");
        assert_eq!(lobbies[0].slot_count, 3);
    }

    #[test]
    fn referee_resolution() {
        let layout = QualifierLayout::new(1);
        let rows = [
            row(5, &["A1", "", "", "zebra", ""], None, None),
            row(6, &["A2", "", "", "giraffe", ""], None, None),
            row(7, &["A3", "", "", "", ""], None, None),
        ];
        let lobbies = load_qualifiers(&rows, &layout, &players(), &referees());
        assert_eq!(lobbies[0].lobby.referee.as_ref().unwrap().discord_name, "zebra#0");
        assert_eq!(lobbies[1].lobby.referee, None);
        assert_eq!(lobbies[2].lobby.referee, None);
    }

    #[test]
    fn match_rows_decode_both_player_slots() {
        let layout = MatchLayout::default();
        let rows = [
            row(3, &["B1", "", "", "zebra", "", "Cool Cats", "Sharp Shooters"], Some(45157.0), Some(0.25)),
            row(4, &["B2", "", "", "", "", "Cool Cats", "Unregistered"], None, None),
        ];
        let matches = load_matches(&rows, &layout, &players(), &referees());
        assert_eq!(matches[0].player1.as_ref().unwrap().team_name, "Cool Cats");
        assert_eq!(matches[0].player2.as_ref().unwrap().team_name, "Sharp Shooters");
        assert_eq!(matches[0].lobby.time, Utc.with_ymd_and_hms(2023, 8, 19, 6, 0, 0).unwrap());
        assert_eq!(matches[1].player2, None);
        assert_eq!(matches[1].lobby.time, DateTime::UNIX_EPOCH);
    }
}
