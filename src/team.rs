//! Tournament participants and the CSV directories they're looked up in.

use {
    std::path::Path,
    crate::prelude::*,
};
#[cfg(test)] use std::io;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Csv(#[from] csv::Error),
}

/// A tournament player. Represents either a solo player or an entire team;
/// in a 1v1 setting `team_name` matches `osu_name`, in a team setting
/// `osu_name` and `discord_name` belong to the team captain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Player {
    pub(crate) team_name: String,
    pub(crate) osu_name: String,
    pub(crate) discord_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Referee {
    pub(crate) osu_name: String,
    pub(crate) discord_name: String,
}

#[derive(Deserialize)]
struct PlayerRecord {
    #[serde(rename = "Team Name")]
    team_name: String,
    #[serde(rename = "Captain osu! Username")]
    osu_name: String,
    #[serde(rename = "Captain Discord Username")]
    discord_name: String,
}

#[derive(Deserialize)]
struct RefereeRecord {
    #[serde(rename = "osu! Username")]
    osu_name: String,
    #[serde(rename = "Discord Username")]
    discord_name: String,
}

/// Returns the only element of `iter`, or `None` if there are zero or
/// several. A duplicate directory entry is indistinguishable from a missing
/// one on purpose; admins have to check the CSV themselves either way.
fn unique<T>(mut iter: impl Iterator<Item = T>) -> Option<T> {
    let first = iter.next()?;
    iter.next().is_none().then_some(first)
}

/// The registered players, reloaded from CSV for every command so roster
/// edits don't require a bot restart.
pub(crate) struct PlayerDirectory {
    entries: Vec<Player>,
}

impl PlayerDirectory {
    pub(crate) fn load(path: &Path) -> Result<Self, Error> {
        let mut entries = Vec::default();
        for record in csv::Reader::from_path(path)?.deserialize() {
            let PlayerRecord { team_name, osu_name, discord_name } = record?;
            entries.push(Player { team_name, osu_name, discord_name });
        }
        Ok(Self { entries })
    }

    #[cfg(test)]
    pub(crate) fn from_reader(reader: impl io::Read) -> Result<Self, Error> {
        let mut entries = Vec::default();
        for record in csv::Reader::from_reader(reader).deserialize() {
            let PlayerRecord { team_name, osu_name, discord_name } = record?;
            entries.push(Player { team_name, osu_name, discord_name });
        }
        Ok(Self { entries })
    }

    pub(crate) fn by_team_name(&self, team_name: &str) -> Option<Player> {
        unique(self.entries.iter().filter(|player| player.team_name == team_name)).cloned()
    }

    pub(crate) fn by_discord_name(&self, discord_name: &str) -> Option<Player> {
        unique(self.entries.iter().filter(|player| player.discord_name == discord_name)).cloned()
    }
}

/// Same shape as [`PlayerDirectory`] but for referees, keyed by osu! username.
pub(crate) struct RefereeDirectory {
    entries: Vec<Referee>,
}

impl RefereeDirectory {
    pub(crate) fn load(path: &Path) -> Result<Self, Error> {
        let mut entries = Vec::default();
        for record in csv::Reader::from_path(path)?.deserialize() {
            let RefereeRecord { osu_name, discord_name } = record?;
            entries.push(Referee { osu_name, discord_name });
        }
        Ok(Self { entries })
    }

    #[cfg(test)]
    pub(crate) fn from_reader(reader: impl io::Read) -> Result<Self, Error> {
        let mut entries = Vec::default();
        for record in csv::Reader::from_reader(reader).deserialize() {
            let RefereeRecord { osu_name, discord_name } = record?;
            entries.push(Referee { osu_name, discord_name });
        }
        Ok(Self { entries })
    }

    pub(crate) fn by_osu_name(&self, osu_name: &str) -> Option<Referee> {
        unique(self.entries.iter().filter(|referee| referee.osu_name == osu_name)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYERS_CSV: &str = "\
Team Name,Captain osu! Username,Captain Discord Username
Cool Cats,whiskers,whiskers#0
Sharp Shooters,deadeye,deadeye#0
Dupes,first,first#0
Dupes,second,second#0
";

    const REFEREES_CSV: &str = "\
osu! Username,Discord Username
zebra,zebra#0
";

    #[test]
    fn lookup_by_team_name() {
        let directory = PlayerDirectory::from_reader(PLAYERS_CSV.as_bytes()).unwrap();
        let player = directory.by_team_name("Cool Cats").unwrap();
        assert_eq!(player.osu_name, "whiskers");
        assert_eq!(player.discord_name, "whiskers#0");
    }

    #[test]
    fn lookup_by_discord_name() {
        let directory = PlayerDirectory::from_reader(PLAYERS_CSV.as_bytes()).unwrap();
        assert_eq!(directory.by_discord_name("deadeye#0").unwrap().team_name, "Sharp Shooters");
    }

    #[test]
    fn missing_and_duplicate_entries_both_resolve_to_none() {
        let directory = PlayerDirectory::from_reader(PLAYERS_CSV.as_bytes()).unwrap();
        assert_eq!(directory.by_team_name("No Such Team"), None);
        assert_eq!(directory.by_team_name("Dupes"), None);
    }

    #[test]
    fn referee_lookup() {
        let directory = RefereeDirectory::from_reader(REFEREES_CSV.as_bytes()).unwrap();
        assert_eq!(directory.by_osu_name("zebra").unwrap().discord_name, "zebra#0");
        assert_eq!(directory.by_osu_name("nobody"), None);
    }
}
