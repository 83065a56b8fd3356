use crate::domain::category::ResourceCategory;
use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Poll,
    Verify,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    kind: ScriptKind,
    category: String,
    reference: String,
    #[serde(default)]
    responses: String,
}

/// One monitor to run during a replay and the backend replies it will see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRow {
    pub kind: ScriptKind,
    pub category: ResourceCategory,
    pub reference: String,
    pub responses: Vec<String>,
}

impl TryFrom<RawRow> for ScriptRow {
    type Error = WatchError;

    fn try_from(raw: RawRow) -> Result<Self> {
        let category = raw.category.parse()?;
        if raw.reference.is_empty() {
            return Err(WatchError::InvalidScript("missing reference".to_string()));
        }
        let responses: Vec<String> = raw.responses.split_whitespace().map(str::to_string).collect();
        if responses.is_empty() {
            return Err(WatchError::InvalidScript(format!(
                "no responses scripted for {}",
                raw.reference
            )));
        }
        Ok(Self {
            kind: raw.kind,
            category,
            reference: raw.reference,
            responses,
        })
    }
}

/// Reads replay scripts from a CSV source with the header
/// `kind, category, reference, responses`.
///
/// `responses` is a space-separated list of backend replies, e.g.
/// `processing processing confirmed`. Whitespace around fields is trimmed.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields rows; a malformed row yields an `Err` and the iterator
    /// carries on with the next one.
    pub fn rows(self) -> impl Iterator<Item = Result<ScriptRow>> {
        self.reader.into_deserialize::<RawRow>().map(|result| {
            result
                .map_err(WatchError::from)
                .and_then(ScriptRow::try_from)
        })
    }
}
