use time::Date;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("billing window end {end} must be after start {start}")]
    InvalidWindow { start: Date, end: Date },
    #[error("invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },
    #[error("invalid flag '{0}'")]
    InvalidFlag(String),
    #[error("rate entry in {table} is missing '{field}'")]
    MissingField { table: &'static str, field: &'static str },
    #[error("malformed rate history: {0}")]
    MalformedHistory(String),
}
