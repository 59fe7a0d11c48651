use {
    serenity::model::id::GuildId,
    crate::{
        prelude::*,
        sheets,
    },
};
#[cfg(unix)] use xdg::BaseDirectories;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[cfg(unix)]
    #[error("missing config file")]
    Missing,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    pub(crate) discord: ConfigDiscord,
    pub(crate) spreadsheet_id: String,
    pub(crate) google_service_account: PathBuf,
    pub(crate) players_csv: PathBuf,
    pub(crate) referees_csv: PathBuf,
    pub(crate) qualifiers: ConfigQualifiers,
    pub(crate) bracket: ConfigBracket,
    /// Stage name → inclusive date range, e.g. `{"Qualifiers": {"start": "2023-08-14", "end": "2023-08-20"}}`.
    pub(crate) stages: HashMap<String, ConfigStageRange>,
}

impl Config {
    pub(crate) async fn load(path: Option<PathBuf>) -> Result<Self, Error> {
        if let Some(path) = path {
            return Ok(serde_json::from_slice(&tokio::fs::read(path).await?)?)
        }
        #[cfg(unix)] {
            if let Some(config_path) = BaseDirectories::new().find_config_file("tourney-house.json") {
                Ok(serde_json::from_slice(&tokio::fs::read(config_path).await?)?)
            } else {
                Err(Error::Missing)
            }
        }
        #[cfg(windows)] {
            Ok(serde_json::from_slice(&tokio::fs::read("cfg/tourney-house.json").await?)?)
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDiscord {
    pub(crate) bot_token: String,
    pub(crate) guilds: Vec<GuildId>,
}

/// Sheet layout for the qualifier worksheet. `range` covers the full lobby
/// table; the player slot columns run from `slotsStart` to `slotsEnd`
/// inclusive, immediately after the referee column.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigQualifiers {
    pub(crate) worksheet: String,
    pub(crate) range: String,
    pub(crate) date_col: String,
    pub(crate) time_col: String,
    pub(crate) slots_start: String,
    pub(crate) slots_end: String,
}

impl ConfigQualifiers {
    pub(crate) fn slot_count(&self) -> Option<usize> {
        let start = sheets::col_index(&self.slots_start)?;
        let end = sheets::col_index(&self.slots_end)?;
        (start <= end).then(|| (end - start + 1) as usize)
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigBracket {
    pub(crate) worksheet: String,
    pub(crate) range: String,
    pub(crate) date_col: String,
    pub(crate) time_col: String,
}

#[derive(Clone, Copy, Deserialize)]
pub(crate) struct ConfigStageRange {
    pub(crate) start: NaiveDate,
    pub(crate) end: NaiveDate,
}
