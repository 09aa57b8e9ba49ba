// src/export/batch.rs
use crate::error::{WaveLogError, Result};
use crate::export::csv_export::{export_run, ExportSummary, TimeColumn};
use crate::reader::{RunSelector, WaveLogReader};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// One converted log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub input: PathBuf,
    pub output: PathBuf,
    pub summary: ExportSummary,
}

/// Outcome of a directory conversion
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<Converted>,
    pub failed: Vec<(PathBuf, WaveLogError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// `*.bin` files directly inside `dir`, sorted by name
pub fn list_logs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let is_log = path.is_file() && path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("bin"));
        if is_log {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}

/// Convert the selected run of every log in `input_dir` to
/// `<output_dir>/<stem>.csv`.
///
/// A file that fails to convert is recorded in the report and the remaining
/// files are still processed. Only directory-level I/O errors are returned.
pub fn convert_dir(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    selector: RunSelector,
    time_column: TimeColumn,
) -> Result<BatchReport> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let mut report = BatchReport::default();
    for input in list_logs(input_dir)? {
        let Some(stem) = input.file_stem() else {
            continue;
        };
        let output = output_dir.join(format!("{}.csv", stem.to_string_lossy()));
        info!("Converting {} -> {}", input.display(), output.display());

        let result = WaveLogReader::open(&input)
            .and_then(|mut reader| export_run(&mut reader, selector, &output, time_column));
        match result {
            Ok(summary) => report.converted.push(Converted { input, output, summary }),
            Err(e) => {
                warn!("Failed to convert {}: {}", input.display(), e);
                report.failed.push((input, e));
            }
        }
    }

    info!("Converted {} logs ({} failed)", report.converted.len(), report.failed.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentHeader;
    use crate::types::Channel;

    fn write_log(path: &Path, runs: u64) {
        let mut bytes = Vec::new();
        for t0 in 0..runs {
            let h = SegmentHeader::new(3, t0, 1000, 1e-9, 0.0, 0.0, 0.04, 0.0, 127.0, Channel::CH1);
            bytes.extend_from_slice(&h.encode());
            bytes.extend([127u8, 128, 129]);
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_convert_dir_continues_past_failures() {
        let input = tempfile::tempdir().unwrap();
        let output = input.path().join("CSV");
        write_log(&input.path().join("b.bin"), 2);
        write_log(&input.path().join("a.bin"), 1);
        write_log(&input.path().join("empty.bin"), 0);
        std::fs::write(input.path().join("notes.txt"), "skip me").unwrap();

        let report = convert_dir(input.path(), &output, RunSelector::Last, TimeColumn::Relative).unwrap();

        assert_eq!(report.converted.len(), 2);
        assert_eq!(report.converted[0].input.file_name().unwrap(), "a.bin");
        assert_eq!(report.converted[1].output, output.join("b.csv"));
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, WaveLogError::NoRuns));
        assert!(!report.is_success());

        assert!(output.join("a.csv").exists());
        assert!(!output.join("empty.csv").exists());
        let text = std::fs::read_to_string(output.join("b.csv")).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_list_logs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("z.bin"), b"").unwrap();
        std::fs::write(dir.path().join("m.BIN"), b"").unwrap();
        std::fs::write(dir.path().join("a.csv"), b"").unwrap();
        let logs = list_logs(dir.path()).unwrap();
        let names: Vec<_> = logs.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["m.BIN", "z.bin"]);
    }
}
