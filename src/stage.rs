//! Resolving relative weekday references against the tournament calendar.

use crate::{
    config::ConfigStageRange,
    prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("no ongoing stage covers {0}")]
    StageNotFound(NaiveDate),
}

struct Stage {
    name: String,
    dates: Vec<NaiveDate>,
}

/// The tournament calendar: every stage expanded to its full list of dates.
///
/// Stage ranges are assumed not to overlap and to span at least a full week;
/// both are validated by the tournament admin, not here.
pub(crate) struct StageCalendar {
    stages: Vec<Stage>,
}

impl StageCalendar {
    pub(crate) fn new(ranges: &HashMap<String, ConfigStageRange>) -> Self {
        let mut stages = ranges.iter()
            .map(|(name, range)| Stage {
                name: name.clone(),
                dates: range.start.iter_days().take_while(|date| *date <= range.end).collect(),
            })
            .collect::<Vec<_>>();
        stages.sort_by_key(|stage| stage.dates.first().copied());
        Self { stages }
    }

    pub(crate) fn stage_for(&self, date: NaiveDate) -> Option<&str> {
        self.stages.iter()
            .find(|stage| stage.dates.first().is_some_and(|start| *start <= date) && stage.dates.last().is_some_and(|end| date <= *end))
            .map(|stage| &*stage.name)
    }

    /// Resolves a weekday + time of day to an absolute timestamp within the
    /// stage that's ongoing on `reference_date`.
    ///
    /// When a stage spans more than one week, the latest matching date wins.
    /// Hour and minute ranges are enforced by the command layer.
    pub(crate) fn resolve(&self, reference_date: NaiveDate, weekday: Weekday, hour: u32, minute: u32) -> Result<DateTime<Utc>, Error> {
        let stage = self.stages.iter()
            .find(|stage| stage.dates.first().is_some_and(|start| *start <= reference_date) && stage.dates.last().is_some_and(|end| reference_date <= *end))
            .ok_or(Error::StageNotFound(reference_date))?;
        let date = stage.dates.iter().rev()
            .find(|date| date.weekday() == weekday)
            .expect("stage spans less than a full week");
        Ok(date.and_hms_opt(hour, minute, 0).expect("hour or minute out of range").and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualifiers_week() -> StageCalendar {
        StageCalendar::new(&HashMap::from([("Qualifiers".to_owned(), ConfigStageRange {
            start: NaiveDate::from_ymd_opt(2023, 8, 14).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 8, 20).unwrap(),
        })]))
    }

    #[test]
    fn resolves_weekday_within_ongoing_stage() {
        let calendar = qualifiers_week();
        let reference = NaiveDate::from_ymd_opt(2023, 8, 16).unwrap();
        assert_eq!(
            calendar.resolve(reference, Weekday::Mon, 18, 30).unwrap(),
            Utc.with_ymd_and_hms(2023, 8, 14, 18, 30, 0).unwrap(),
        );
    }

    #[test]
    fn uncovered_date_is_stage_not_found() {
        let calendar = qualifiers_week();
        let reference = NaiveDate::from_ymd_opt(2023, 8, 21).unwrap();
        assert!(matches!(calendar.resolve(reference, Weekday::Mon, 18, 30), Err(Error::StageNotFound(_))));
    }

    #[test]
    fn multi_week_stage_resolves_to_latest_occurrence() {
        let calendar = StageCalendar::new(&HashMap::from([("Bracket".to_owned(), ConfigStageRange {
            start: NaiveDate::from_ymd_opt(2023, 8, 14).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 8, 27).unwrap(),
        })]));
        let reference = NaiveDate::from_ymd_opt(2023, 8, 15).unwrap();
        assert_eq!(
            calendar.resolve(reference, Weekday::Fri, 20, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 8, 25, 20, 0, 0).unwrap(),
        );
    }

    #[test]
    fn stage_lookup_is_inclusive_on_both_ends() {
        let calendar = qualifiers_week();
        assert_eq!(calendar.stage_for(NaiveDate::from_ymd_opt(2023, 8, 14).unwrap()), Some("Qualifiers"));
        assert_eq!(calendar.stage_for(NaiveDate::from_ymd_opt(2023, 8, 20).unwrap()), Some("Qualifiers"));
        assert_eq!(calendar.stage_for(NaiveDate::from_ymd_opt(2023, 8, 13).unwrap()), None);
    }
}
