use super::script_reader::ScriptKind;
use crate::domain::category::ResourceCategory;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Final result of one replayed monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub kind: ScriptKind,
    pub category: ResourceCategory,
    pub reference: String,
    pub outcome: String,
    pub attempts: u32,
    pub last_status: String,
}

pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes a header row followed by one row per outcome, then flushes.
    pub fn write_outcomes(
        &mut self,
        outcomes: impl IntoIterator<Item = OutcomeRecord>,
    ) -> Result<()> {
        for outcome in outcomes {
            self.writer.serialize(outcome)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
