use csv::StringRecord;
use tariff_client::domain::{dates, parse_flag};
use time::{Date, PrimitiveDateTime};

use crate::pipeline::PipelineError;

/// A CSV record read by header name.
pub(crate) struct CsvRow<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
}

impl<'a> CsvRow<'a> {
    pub(crate) fn new(headers: &'a StringRecord, record: &'a StringRecord) -> Self {
        Self { headers, record }
    }

    pub(crate) fn line(&self) -> u64 {
        self.record.position().map_or(0, |p| p.line())
    }

    fn error(&self, msg: String) -> PipelineError {
        PipelineError::Source(format!("line {}: {msg}", self.line()))
    }

    pub(crate) fn get(&self, name: &str) -> Result<&'a str, PipelineError> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| self.record.get(idx))
            .map(str::trim)
            .ok_or_else(|| self.error(format!("missing column '{name}'")))
    }

    /// `None` for an absent column or a blank cell.
    pub(crate) fn optional(&self, name: &str) -> Option<&'a str> {
        self.get(name).ok().filter(|v| !v.is_empty())
    }

    pub(crate) fn f64(&self, name: &str) -> Result<f64, PipelineError> {
        let raw = self.get(name)?;
        raw.parse()
            .map_err(|e| self.error(format!("invalid {name} '{raw}': {e}")))
    }

    pub(crate) fn optional_f64(&self, name: &str) -> Result<Option<f64>, PipelineError> {
        self.optional(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|e| self.error(format!("invalid {name} '{raw}': {e}")))
            })
            .transpose()
    }

    pub(crate) fn i64(&self, name: &str) -> Result<i64, PipelineError> {
        let raw = self.get(name)?;
        raw.parse()
            .map_err(|e| self.error(format!("invalid {name} '{raw}': {e}")))
    }

    pub(crate) fn date(&self, name: &str) -> Result<Date, PipelineError> {
        dates::parse_date(self.get(name)?).map_err(|e| self.error(e.to_string()))
    }

    pub(crate) fn timestamp(&self, name: &str) -> Result<PrimitiveDateTime, PipelineError> {
        dates::parse_timestamp(self.get(name)?).map_err(|e| self.error(e.to_string()))
    }

    /// Blank or absent reads as `false`.
    pub(crate) fn flag(&self, name: &str) -> Result<bool, PipelineError> {
        parse_flag(self.optional(name).unwrap_or("")).map_err(|e| self.error(e.to_string()))
    }
}
