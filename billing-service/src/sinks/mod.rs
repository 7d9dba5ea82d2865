pub mod csv_report;
pub mod ndjson;

pub use csv_report::{BillReportRow, CsvReportSink};
pub use ndjson::NdjsonSink;
