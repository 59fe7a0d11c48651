//! The Google Sheets backing store.
//!
//! The spreadsheet is the system of record for the tournament schedule; this
//! module is the only place that talks to it. Reads pull the formatted cell
//! grid plus a second, unformatted pass over the date and time columns (those
//! arrive as serial day counts, see [`crate::roster`]), writes are row-scoped
//! batch updates. No retries; a failed round-trip propagates to the command
//! layer.

use {
    std::{
        fmt,
        path::Path,
        sync::LazyLock,
    },
    serde::Serialize,
    tokio::{
        sync::Mutex,
        time::{
            Instant,
            sleep_until,
        },
    },
    yup_oauth2::{
        ServiceAccountAuthenticator,
        read_service_account_key,
    },
    crate::prelude::*,
};

/// from <https://developers.google.com/sheets/api/limits#quota>:
///
/// > Read requests […] Per minute per user per project […] 60
const RATE_LIMIT: Duration = Duration::from_secs(1);

static NEXT_REQUEST: LazyLock<Mutex<Instant>> = LazyLock::new(|| Mutex::new(Instant::now()));

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] OAuth(#[from] yup_oauth2::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("empty token is not valid")]
    EmptyToken,
    #[error("OAuth token is expired")]
    TokenExpired,
    #[error("malformed A1 range: {0:?}")]
    MalformedRange(String),
    #[error("unexpected batchGet response shape")]
    BatchShape,
}

/// Converts column letters to a 0-based index (`A` → 0, `AA` → 26).
pub(crate) fn col_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) { return None }
    Some(letters.chars().fold(0, |acc, c| acc * 26 + (c as u32 - 'A' as u32 + 1)) - 1)
}

/// An A1-notation rectangle of the form `<ColLetters><Row>:<ColLetters><Row>`,
/// e.g. `A5:L20`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetRange {
    pub(crate) start_col: String,
    pub(crate) start_row: u32,
    pub(crate) end_col: String,
    pub(crate) end_row: u32,
}

impl SheetRange {
    pub(crate) fn parse(range: &str) -> Result<Self, Error> {
        fn cell(name: &str) -> Option<(String, u32)> {
            let split = name.find(|c: char| c.is_ascii_digit())?;
            let (col, row) = name.split_at(split);
            col_index(col)?;
            Some((col.to_owned(), row.parse().ok()?))
        }

        let malformed = || Error::MalformedRange(range.to_owned());
        let (start, end) = range.split_once(':').ok_or_else(malformed)?;
        let (start_col, start_row) = cell(start).ok_or_else(malformed)?;
        let (end_col, end_row) = cell(end).ok_or_else(malformed)?;
        if start_row > end_row || col_index(&start_col) > col_index(&end_col) {
            return Err(malformed())
        }
        Ok(Self { start_col, start_row, end_col, end_row })
    }

    pub(crate) fn width(&self) -> usize {
        (col_index(&self.end_col).expect("validated at parse") - col_index(&self.start_col).expect("validated at parse") + 1) as usize
    }

    pub(crate) fn height(&self) -> usize {
        (self.end_row - self.start_row + 1) as usize
    }

    /// The sub-range covering a single column over the same rows.
    pub(crate) fn single_col(&self, col: &str) -> String {
        format!("{col}{}:{col}{}", self.start_row, self.end_row)
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}{}", self.start_col, self.start_row, self.end_col, self.end_row)
    }
}

/// One decoded row of a lobby table: the formatted cell values padded to the
/// range width, plus the raw date/time serials for the configured columns.
#[derive(Debug, Clone)]
pub(crate) struct SheetRow {
    /// 1-based sheet row, used to address write-backs.
    pub(crate) row: u32,
    pub(crate) cells: Vec<String>,
    pub(crate) date_serial: Option<f64>,
    pub(crate) time_serial: Option<f64>,
}

async fn auth_token(service_account: &Path) -> Result<String, Error> {
    let key = read_service_account_key(service_account).await?;
    let auth = ServiceAccountAuthenticator::builder(key).build().await?;
    let token = auth.token(&["https://www.googleapis.com/auth/spreadsheets"]).await?;
    if token.is_expired() { return Err(Error::TokenExpired) }
    let Some(token) = token.token() else { return Err(Error::EmptyToken) };
    if token.is_empty() { return Err(Error::EmptyToken) }
    Ok(token.to_owned())
}

/// Reads a lobby table fresh from the spreadsheet.
///
/// The Sheets API truncates trailing empty cells and rows, so the grid is
/// padded back out to the requested rectangle; the roster loader relies on
/// every row having the full layout width.
pub(crate) async fn read_table(
    http_client: &reqwest::Client,
    service_account: &Path,
    spreadsheet_id: &str,
    worksheet: &str,
    range: &SheetRange,
    date_col: &str,
    time_col: &str,
) -> Result<Vec<SheetRow>, Error> {
    #[derive(Deserialize)]
    struct ValueRange {
        #[serde(default)]
        values: Vec<Vec<String>>,
    }

    #[derive(Deserialize)]
    struct RawValueRange {
        #[serde(default)]
        values: Vec<Vec<serde_json::Value>>,
    }

    #[derive(Deserialize)]
    struct BatchGetResponse {
        #[serde(rename = "valueRanges")]
        value_ranges: Vec<RawValueRange>,
    }

    let mut next_request = NEXT_REQUEST.lock().await;
    sleep_until(*next_request).await;
    let token = auth_token(service_account).await?;
    let formatted = http_client.get(format!("https://sheets.googleapis.com/v4/spreadsheets/{spreadsheet_id}/values/{worksheet}!{range}"))
        .bearer_auth(&token)
        .query(&[
            ("valueRenderOption", "FORMATTED_VALUE"),
            ("majorDimension", "ROWS"),
        ])
        .send().await?
        .error_for_status()?
        .json::<ValueRange>().await?;
    let raw = http_client.get(format!("https://sheets.googleapis.com/v4/spreadsheets/{spreadsheet_id}/values:batchGet"))
        .bearer_auth(&token)
        .query(&[
            ("ranges", &*format!("{worksheet}!{}", range.single_col(date_col))),
            ("ranges", &*format!("{worksheet}!{}", range.single_col(time_col))),
            ("valueRenderOption", "UNFORMATTED_VALUE"),
            ("majorDimension", "ROWS"),
        ])
        .send().await?
        .error_for_status()?
        .json::<BatchGetResponse>().await?;
    *next_request = Instant::now() + RATE_LIMIT;
    drop(next_request);
    let [dates, times] = <[_; 2]>::try_from(raw.value_ranges).map_err(|_| Error::BatchShape)?;
    Ok(build_rows(range, formatted.values, dates.values, times.values))
}

fn build_rows(range: &SheetRange, formatted: Vec<Vec<String>>, dates: Vec<Vec<serde_json::Value>>, times: Vec<Vec<serde_json::Value>>) -> Vec<SheetRow> {
    let serial_at = |grid: &[Vec<serde_json::Value>], idx: usize| grid.get(idx).and_then(|row| row.first()).and_then(serde_json::Value::as_f64);
    (0..range.height())
        .map(|idx| {
            let mut cells = formatted.get(idx).cloned().unwrap_or_default();
            cells.resize(range.width(), String::default());
            SheetRow {
                row: range.start_row + idx as u32,
                date_serial: serial_at(&dates, idx),
                time_serial: serial_at(&times, idx),
                cells,
            }
        })
        .collect()
}

/// Applies row deltas in one request, in order. Values go in as
/// `USER_ENTERED` so the sheet parses dates and times the same way a human
/// typing them would get.
pub(crate) async fn batch_update_values(
    http_client: &reqwest::Client,
    service_account: &Path,
    spreadsheet_id: &str,
    data: Vec<(String, Vec<Vec<String>>)>,
) -> Result<(), Error> {
    #[derive(Serialize)]
    struct BatchUpdateRequest {
        data: Vec<ValueRange>,
        #[serde(rename = "valueInputOption")]
        value_input_option: String,
    }

    #[derive(Serialize)]
    struct ValueRange {
        range: String,
        values: Vec<Vec<String>>,
    }

    if data.is_empty() {
        return Ok(())
    }
    let mut next_request = NEXT_REQUEST.lock().await;
    sleep_until(*next_request).await;
    let token = auth_token(service_account).await?;
    http_client.post(format!("https://sheets.googleapis.com/v4/spreadsheets/{spreadsheet_id}/values:batchUpdate"))
        .bearer_auth(&token)
        .json(&BatchUpdateRequest {
            data: data.into_iter().map(|(range, values)| ValueRange { range, values }).collect(),
            value_input_option: "USER_ENTERED".to_owned(),
        })
        .send().await?
        .error_for_status()?;
    *next_request = Instant::now() + RATE_LIMIT;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_index_math() {
        assert_eq!(col_index("A"), Some(0));
        assert_eq!(col_index("E"), Some(4));
        assert_eq!(col_index("Z"), Some(25));
        assert_eq!(col_index("AA"), Some(26));
        assert_eq!(col_index(""), None);
        assert_eq!(col_index("a1"), None);
    }

    #[test]
    fn range_parse_and_display() {
        let range = SheetRange::parse("B5:K20").unwrap();
        assert_eq!(range.start_col, "B");
        assert_eq!(range.start_row, 5);
        assert_eq!(range.end_col, "K");
        assert_eq!(range.end_row, 20);
        assert_eq!(range.width(), 10);
        assert_eq!(range.height(), 16);
        assert_eq!(range.to_string(), "B5:K20");
        assert_eq!(range.single_col("C"), "C5:C20");
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert!(SheetRange::parse("B5").is_err());
        assert!(SheetRange::parse("5B:K20").is_err());
        assert!(SheetRange::parse("B5:A4").is_err());
        assert!(SheetRange::parse("K5:B20").is_err());
    }

    #[test]
    fn build_rows_pads_to_the_requested_rectangle() {
        let range = SheetRange::parse("A5:D7").unwrap();
        let formatted = vec![
            vec!["A1".to_owned(), "Sat Aug 19".to_owned()],
            vec![],
        ];
        let dates = vec![vec![serde_json::json!(45157.0)]];
        let times = vec![vec![serde_json::json!(0.75)], vec![serde_json::json!("oops")]];
        let rows = build_rows(&range, formatted, dates, times);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].row, 5);
        assert_eq!(rows[0].cells, ["A1", "Sat Aug 19", "", ""]);
        assert_eq!(rows[0].date_serial, Some(45157.0));
        assert_eq!(rows[0].time_serial, Some(0.75));
        assert_eq!(rows[1].row, 6);
        assert_eq!(rows[1].cells, ["", "", "", ""]);
        assert_eq!(rows[1].date_serial, None);
        // non-numeric unformatted value degrades to no serial
        assert_eq!(rows[1].time_serial, None);
        assert_eq!(rows[2].row, 7);
    }
}
