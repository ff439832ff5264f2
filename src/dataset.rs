//! Score dataset loading.
//!
//! The trail score CSV has been exported from spreadsheets on different
//! machines, so its encoding is not known up front. Each candidate encoding
//! is tried in order; a decode that succeeds is still rejected unless the
//! headers contain enough known emotion labels, because a wrong legacy
//! codec happily turns UTF-8 bytes into valid-looking garbage.

use crate::emotions::PositiveEmotion;
use encoding_rs::{EUC_KR, UTF_8};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Natural key column.
pub const NAME_COLUMN: &str = "INTEGRATED_NAME";
pub const ADDRESS_COLUMN: &str = "ADDRESS";

/// How many positive-emotion headers must be recognized for a decode to count.
const MIN_EMOTION_HEADERS: usize = 5;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Utf8Sig,
    Windows949,
    StrictEucKr,
    Lossy,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    label: &'static str,
    decoder: Decoder,
}

/// Tried in order, first table with valid headers wins.
///
/// `euc-kr` never wins in practice: bytes that pass the strict KS X 1001
/// check decode to the same text through `cp949`, which was already tried
/// and judged on the same headers. Its rejection still shows up in the
/// attempt log.
const CANDIDATES: [Candidate; 3] = [
    Candidate { label: "utf-8-sig", decoder: Decoder::Utf8Sig },
    Candidate { label: "cp949", decoder: Decoder::Windows949 },
    Candidate { label: "euc-kr", decoder: Decoder::StrictEucKr },
];

/// Last resort once every candidate failed validation.
const FALLBACK: Candidate = Candidate { label: "default", decoder: Decoder::Lossy };

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("score dataset not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read score dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("no encoding produced valid emotion headers ({})", .attempts.join("; "))]
    InvalidHeaders { attempts: Vec<String> },
}

/// Why a single decode attempt was rejected.
#[derive(Debug)]
enum AttemptError {
    Malformed,
    Csv(csv::Error),
    MissingNameColumn,
    TooFewEmotionHeaders(usize),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Malformed => write!(f, "malformed byte sequence"),
            AttemptError::Csv(e) => write!(f, "csv error: {}", e),
            AttemptError::MissingNameColumn => write!(f, "missing {} column", NAME_COLUMN),
            AttemptError::TooFewEmotionHeaders(n) => {
                write!(f, "only {} emotion headers recognized", n)
            }
        }
    }
}

/// One trail in the score table.
#[derive(Debug, Clone)]
pub struct TrailRow {
    pub name: String,
    pub address: Option<String>,
    scores: HashMap<PositiveEmotion, f64>,
}

impl TrailRow {
    pub fn new(
        name: impl Into<String>,
        address: Option<String>,
        scores: HashMap<PositiveEmotion, f64>,
    ) -> Self {
        Self { name: name.into(), address, scores }
    }

    /// Score for an emotion, `None` when the cell was empty or not numeric.
    pub fn score(&self, emotion: PositiveEmotion) -> Option<f64> {
        self.scores.get(&emotion).copied()
    }
}

/// Immutable in-memory score table.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    pub encoding: &'static str,
    pub columns: Vec<String>,
    emotion_columns: Vec<PositiveEmotion>,
    pub rows: Vec<TrailRow>,
}

impl ScoreTable {
    pub fn new(
        encoding: &'static str,
        columns: Vec<String>,
        emotion_columns: Vec<PositiveEmotion>,
        rows: Vec<TrailRow>,
    ) -> Self {
        Self { encoding, columns, emotion_columns, rows }
    }

    pub fn has_column(&self, emotion: PositiveEmotion) -> bool {
        self.emotion_columns.contains(&emotion)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Trim, drop a leading BOM and any replacement characters.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .replace('\u{fffd}', "")
        .trim()
        .to_string()
}

/// Pure KS X 1001 EUC-KR: ASCII, or lead and trail both in `0xA1..=0xFE`.
/// The windows-949 extension ranges are rejected.
fn is_strict_euc_kr(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b < 0x80 {
            i += 1;
            continue;
        }
        if !(0xA1..=0xFE).contains(&b) {
            return false;
        }
        match bytes.get(i + 1) {
            Some(t) if (0xA1..=0xFE).contains(t) => i += 2,
            _ => return false,
        }
    }
    true
}

fn decode(bytes: &[u8], decoder: Decoder) -> Option<Cow<'_, str>> {
    match decoder {
        Decoder::Utf8Sig => {
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            UTF_8.decode_without_bom_handling_and_without_replacement(body)
        }
        Decoder::Windows949 => EUC_KR.decode_without_bom_handling_and_without_replacement(bytes),
        Decoder::StrictEucKr => {
            if !is_strict_euc_kr(bytes) {
                return None;
            }
            EUC_KR.decode_without_bom_handling_and_without_replacement(bytes)
        }
        Decoder::Lossy => Some(String::from_utf8_lossy(bytes)),
    }
}

fn parse_table(text: &str, encoding: &'static str) -> Result<ScoreTable, AttemptError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(AttemptError::Csv)?
        .iter()
        .map(normalize_header)
        .collect();
    debug!("Normalized columns ({}): {:?}", encoding, columns);

    let emotion_columns: Vec<(usize, PositiveEmotion)> = PositiveEmotion::ALL
        .iter()
        .filter_map(|e| columns.iter().position(|c| c == e.label()).map(|i| (i, *e)))
        .collect();
    if emotion_columns.len() < MIN_EMOTION_HEADERS {
        return Err(AttemptError::TooFewEmotionHeaders(emotion_columns.len()));
    }

    let name_idx = columns
        .iter()
        .position(|c| c == NAME_COLUMN)
        .ok_or(AttemptError::MissingNameColumn)?;
    let address_idx = columns.iter().position(|c| c == ADDRESS_COLUMN);

    let mut rows = Vec::new();
    let mut unnamed = 0usize;
    for record in reader.records() {
        let record = record.map_err(AttemptError::Csv)?;
        let name = record.get(name_idx).map(str::trim).unwrap_or("");
        if name.is_empty() {
            unnamed += 1;
            continue;
        }
        let address = address_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let scores = emotion_columns
            .iter()
            .filter_map(|(i, e)| {
                let value = record.get(*i)?.trim().parse::<f64>().ok()?;
                value.is_finite().then_some((*e, value))
            })
            .collect();
        rows.push(TrailRow::new(name, address, scores));
    }
    if unnamed > 0 {
        warn!("Skipped {} rows without a trail name", unnamed);
    }

    Ok(ScoreTable::new(
        encoding,
        columns,
        emotion_columns.into_iter().map(|(_, e)| e).collect(),
        rows,
    ))
}

fn attempt(bytes: &[u8], candidate: Candidate) -> Result<ScoreTable, AttemptError> {
    debug!("Trying encoding: {}", candidate.label);
    let text = decode(bytes, candidate.decoder).ok_or(AttemptError::Malformed)?;
    parse_table(&text, candidate.label)
}

/// Decode and validate raw CSV bytes.
pub fn parse_score_bytes(bytes: &[u8]) -> Result<ScoreTable, DatasetError> {
    let mut attempts = Vec::new();

    for candidate in CANDIDATES.iter().copied().chain(std::iter::once(FALLBACK)) {
        match attempt(bytes, candidate) {
            Ok(table) => {
                info!(
                    "📊 Score dataset decoded as {} ({} rows, {} columns)",
                    candidate.label,
                    table.len(),
                    table.columns.len()
                );
                return Ok(table);
            }
            Err(e) => {
                debug!("Encoding {} rejected: {}", candidate.label, e);
                attempts.push(format!("{}: {}", candidate.label, e));
            }
        }
    }

    Err(DatasetError::InvalidHeaders { attempts })
}

/// Load the score table from disk.
pub fn load_score_table(path: &Path) -> Result<ScoreTable, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    parse_score_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
INTEGRATED_NAME,ADDRESS,기쁨,자유로움,성취감,편안함,사랑,감사,흥미,재미,희망,자부심
가로수길,서울시 강남구,4.5,3.0,2.0,4.0,3.5,4.2,3.3,2.8,4.9,3.1
나무공원,서울시 종로구,3.0,4.0,3.0,3.0,4.0,3.0,4.0,3.0,2.0,4.0
,이름 없는 행,1,1,1,1,1,1,1,1,1,1
다리산책로,,x,4.1,3.2,3.9,2.5,4.4,,3.6,3.8,2.9
";

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_utf8_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(CSV.as_bytes());
        let file = write_temp(&bytes);

        let table = load_score_table(file.path()).unwrap();
        assert_eq!(table.encoding, "utf-8-sig");
        assert_eq!(table.columns[0], NAME_COLUMN);
        assert_eq!(table.len(), 3);
        assert!(PositiveEmotion::ALL.iter().all(|e| table.has_column(*e)));
    }

    #[test]
    fn test_korean_legacy_encoding() {
        let (encoded, _, had_errors) = EUC_KR.encode(CSV);
        assert!(!had_errors);
        let file = write_temp(&encoded);

        let table = load_score_table(file.path()).unwrap();
        assert_eq!(table.encoding, "cp949");
        assert_eq!(table.rows[0].name, "가로수길");
        assert_eq!(table.rows[0].address.as_deref(), Some("서울시 강남구"));
    }

    #[test]
    fn test_columns_identical_across_encodings() {
        let utf8 = parse_score_bytes(CSV.as_bytes()).unwrap();
        let (encoded, _, _) = EUC_KR.encode(CSV);
        let legacy = parse_score_bytes(&encoded).unwrap();
        assert_ne!(utf8.encoding, legacy.encoding);
        assert_eq!(utf8.columns, legacy.columns);
    }

    #[test]
    fn test_rows_keep_source_order_and_missing_scores() {
        let table = parse_score_bytes(CSV.as_bytes()).unwrap();
        let names: Vec<&str> = table.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["가로수길", "나무공원", "다리산책로"]);

        let last = &table.rows[2];
        assert_eq!(last.address, None);
        assert_eq!(last.score(PositiveEmotion::Joy), None);
        assert_eq!(last.score(PositiveEmotion::Interest), None);
        assert_eq!(last.score(PositiveEmotion::Hope), Some(3.8));
    }

    #[test]
    fn test_invalid_byte_falls_back_to_lossy_read() {
        let mut bytes = CSV.as_bytes().to_vec();
        bytes.extend_from_slice(b"\xFF\xFE\xFF,x,1,1,1,1,1,1,1,1,1,1\n");
        let table = parse_score_bytes(&bytes).unwrap();
        assert_eq!(table.encoding, "default");
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_rejects_unrelated_headers() {
        let err = parse_score_bytes(b"name,score\nfoo,1\n").unwrap_err();
        match err {
            DatasetError::InvalidHeaders { attempts } => assert_eq!(attempts.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_score_table(Path::new("/nonexistent/score.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" \u{feff}기쁨 "), "기쁨");
        assert_eq!(normalize_header("희\u{fffd}망"), "희망");
    }

    #[test]
    fn test_strict_euc_kr() {
        assert!(is_strict_euc_kr(b"abc\xB0\xA1"));
        assert!(!is_strict_euc_kr(b"\x81\x41"));
        assert!(!is_strict_euc_kr(b"\xB0"));
    }
}
