// src/export/mod.rs
mod batch;
mod csv_export;

pub use batch::{convert_dir, list_logs, BatchReport, Converted};
pub use csv_export::{
    export_all, export_run, format_time, format_volts, CsvExporter, ExportSummary, TimeColumn,
    FALLBACK_DT_SECONDS,
};
