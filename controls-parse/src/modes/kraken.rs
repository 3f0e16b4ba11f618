//! Kraken2 count mode
//!
//! Kraken2 needs exactly one paired-end read pair. Its per-read stream on
//! stdout is discarded; the structured report written with `--report` is the
//! output that gets cached and parsed.
//!
//! Report columns (tab-separated, no header):
//! `percent  clade_reads  direct_reads  rank_code  taxid  name`
//!
//! Only rows whose rank code is genus (`G` in Kraken2 reports, `genus` in
//! re-exported tables) contribute entries.

use super::tsv::{is_blank_genus, split_lines};
use super::{ClassifierError, GenusRecord, ModeProcessor};
use controls_common::time::local_date;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

const PERCENT_COL: usize = 0;
const CLADE_READS_COL: usize = 1;
const RANK_COL: usize = 3;
const NAME_COL: usize = 5;

/// Header line used as stand-in output
pub const REPORT_HEADER: &str = "percent\tclade_reads\tdirect_reads\trank_code\ttaxid\tname\n";

pub struct KrakenProcessor {
    mode: String,
    binary: String,
    database: PathBuf,
    read_extensions: Vec<String>,
}

impl KrakenProcessor {
    pub fn new(mode: &str, binary: &str, database: &Path, read_extensions: &[String]) -> Self {
        Self {
            mode: mode.to_string(),
            binary: binary.to_string(),
            database: database.to_path_buf(),
            read_extensions: read_extensions.to_vec(),
        }
    }

    /// Run Kraken2 with its report going to `report_path`; stdout is discarded
    fn write_report(
        &self,
        report_path: &Path,
        first: &Path,
        second: &Path,
    ) -> Result<String, ClassifierError> {
        let output = Command::new(&self.binary)
            .arg("--db")
            .arg(&self.database)
            .arg("--paired")
            .arg("--report")
            .arg(report_path)
            .arg(first)
            .arg(second)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ClassifierError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClassifierError::ExitStatus {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let report = fs::read_to_string(report_path)?;
        if report.trim().is_empty() {
            return Err(ClassifierError::EmptyOutput);
        }
        Ok(report)
    }
}

/// In-progress report location beside `output_path`
fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn is_genus_rank(code: &str) -> bool {
    code == "G" || code.eq_ignore_ascii_case("genus")
}

fn file_time(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

/// Read files directly inside `folder` with one of `extensions`
pub fn read_files(folder: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() || e.path_is_symlink())
        .map(|e| e.into_path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            extensions.iter().any(|ext| name.ends_with(&format!(".{}", ext)))
        })
        .collect();
    files.sort();
    files
}

/// Pick the paired-end reads to classify
///
/// With more than two candidates, only files created on the most recent
/// creation date are considered and the two newest of those are used.
pub fn select_read_pair(folder: &Path, extensions: &[String]) -> Result<(PathBuf, PathBuf), ClassifierError> {
    let files = read_files(folder, extensions);
    if files.len() < 2 {
        return Err(ClassifierError::MissingInputs(format!(
            "{} read files in {}",
            files.len(),
            folder.display()
        )));
    }
    if files.len() == 2 {
        return Ok((files[0].clone(), files[1].clone()));
    }

    let mut timed: Vec<(PathBuf, SystemTime)> = files
        .into_iter()
        .filter_map(|p| file_time(&p).map(|t| (p, t)))
        .collect();
    let latest_day = timed
        .iter()
        .map(|(_, t)| local_date(*t))
        .max()
        .ok_or_else(|| ClassifierError::MissingInputs("no readable file times".to_string()))?;
    timed.retain(|(_, t)| local_date(*t) == latest_day);
    timed.sort_by(|a, b| b.1.cmp(&a.1));

    let mut pair: Vec<PathBuf> = timed.into_iter().take(2).map(|(p, _)| p).collect();
    if pair.len() < 2 {
        return Err(ClassifierError::MissingInputs(format!(
            "no read pair shares the latest creation date in {}",
            folder.display()
        )));
    }
    pair.sort();
    let second = pair.pop().unwrap_or_default();
    let first = pair.pop().unwrap_or_default();
    debug!(first = %first.display(), second = %second.display(), "Selected read pair");
    Ok((first, second))
}

impl ModeProcessor for KrakenProcessor {
    fn mode(&self) -> &str {
        &self.mode
    }

    fn run_classifier(&self, folder: &Path, output_path: &Path) -> Result<String, ClassifierError> {
        let (first, second) = select_read_pair(folder, &self.read_extensions)?;

        // Kraken2 writes the report as it goes; only a complete one may
        // land on the cached output path.
        let partial = partial_path(output_path);
        match self.write_report(&partial, &first, &second) {
            Ok(report) => {
                fs::rename(&partial, output_path)?;
                debug!(path = %output_path.display(), "Wrote classifier report");
                Ok(report)
            }
            Err(e) => {
                if partial.exists() {
                    if let Err(remove_err) = fs::remove_file(&partial) {
                        warn!(
                            path = %partial.display(),
                            error = %remove_err,
                            "Could not remove partial report"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn dummy_output(&self) -> String {
        REPORT_HEADER.to_string()
    }

    fn normalize(&self, raw: &str) -> GenusRecord {
        let mut record = GenusRecord::new(&self.mode);

        for fields in split_lines(raw) {
            if fields.len() <= NAME_COL {
                continue;
            }
            if !is_genus_rank(fields[RANK_COL]) {
                continue;
            }
            let name = fields[NAME_COL];
            if is_blank_genus(name) {
                continue;
            }
            let percent = fields[PERCENT_COL].parse::<f64>();
            let count = fields[CLADE_READS_COL].parse::<u64>();
            match (count, percent) {
                (Ok(count), Ok(percent)) => record.insert_count(name, count, percent),
                _ => warn!(mode = %self.mode, genus = %name, "Unparsable report row"),
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::GenusStats;
    use tempfile::TempDir;

    fn processor() -> KrakenProcessor {
        KrakenProcessor::new(
            "kraken",
            "/nonexistent/kraken2",
            Path::new("/db/kraken2"),
            &["fastq".to_string(), "fastq.gz".to_string()],
        )
    }

    const REPORT: &str = "\
 12.50\t1520\t0\tU\t0\tunclassified
 87.50\t10640\t20\tR\t1\troot
 60.00\t7296\t10\tF\t543\t    Enterobacteriaceae
 55.00\t6688\t6000\tG\t590\t      Salmonella
 50.00\t6080\t6080\tS\t28901\t        Salmonella enterica
  5.00\t608\t600\tG\t561\t      Escherichia
  1.00\t121\t121\tG1\t12345\t        Escherichia subgroup
";

    #[test]
    fn test_only_genus_rows_contribute() {
        let record = processor().normalize(REPORT);

        assert_eq!(record.genera().collect::<Vec<_>>(), vec!["Escherichia", "Salmonella"]);
        assert_eq!(
            record.get("Salmonella"),
            Some(&GenusStats::Count {
                count: 6688,
                percent: 55.0
            })
        );
    }

    #[test]
    fn test_spelled_out_genus_rank_accepted() {
        let raw = "2.0\t40\t40\tgenus\t1\tListeria\n3.0\t60\t60\tspecies\t2\tListeria monocytogenes\n";
        let record = processor().normalize(raw);
        assert_eq!(record.genera().collect::<Vec<_>>(), vec!["Listeria"]);
    }

    #[test]
    fn test_header_only_dummy_is_empty() {
        let p = processor();
        assert!(p.normalize(&p.dummy_output()).is_empty());
    }

    #[test]
    fn test_garbage_is_empty() {
        assert!(processor().normalize("not a report\nat all").is_empty());
    }

    #[test]
    fn test_pair_selection_requires_two_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("S1_R1.fastq"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        assert!(matches!(
            select_read_pair(dir.path(), &["fastq".to_string()]),
            Err(ClassifierError::MissingInputs(_))
        ));
    }

    #[test]
    fn test_pair_selection_exact_pair() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("S1_R2.fastq.gz"), "").unwrap();
        fs::write(dir.path().join("S1_R1.fastq.gz"), "").unwrap();

        let (first, second) =
            select_read_pair(dir.path(), &["fastq".to_string(), "fastq.gz".to_string()]).unwrap();
        assert!(first.ends_with("S1_R1.fastq.gz"));
        assert!(second.ends_with("S1_R2.fastq.gz"));
    }

    #[test]
    fn test_pair_selection_narrows_to_newest() {
        let dir = TempDir::new().unwrap();
        for name in ["old_R1.fastq", "old_R2.fastq"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        for name in ["new_R1.fastq", "new_R2.fastq"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let (first, second) = select_read_pair(dir.path(), &["fastq".to_string()]).unwrap();
        assert!(first.ends_with("new_R1.fastq"));
        assert!(second.ends_with("new_R2.fastq"));
    }

    #[test]
    fn test_missing_binary_returns_none() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("S1_R1.fastq"), "").unwrap();
        fs::write(dir.path().join("S1_R2.fastq"), "").unwrap();

        assert!(processor().process(dir.path()).is_none());
    }

    #[cfg(unix)]
    fn fake_kraken(dir: &Path, body: &str) -> KrakenProcessor {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake_kraken2.sh");
        fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        KrakenProcessor::new(
            "kraken",
            &script.to_string_lossy(),
            Path::new("/db/kraken2"),
            &["fastq".to_string()],
        )
    }

    #[cfg(unix)]
    fn paired_sample(dir: &Path) -> PathBuf {
        let sample = dir.join("S1");
        fs::create_dir(&sample).unwrap();
        fs::write(sample.join("S1_R1.fastq"), "").unwrap();
        fs::write(sample.join("S1_R2.fastq"), "").unwrap();
        sample
    }

    #[cfg(unix)]
    #[test]
    fn test_run_classifier_returns_report_not_stdout() {
        let dir = TempDir::new().unwrap();
        let sample = paired_sample(dir.path());
        // Args: --db DB --paired --report PATH R1 R2
        let processor = fake_kraken(
            dir.path(),
            "echo \"C\tread1\t590\" \n\
             echo \"$@\" > \"$(dirname \"$5\")/args.txt\"\n\
             printf ' 55.00\\t550\\t550\\tG\\t590\\t  Salmonella\\n' > \"$5\"\n",
        );

        let text = processor.process(&sample).unwrap();

        assert_eq!(text, " 55.00\t550\t550\tG\t590\t  Salmonella\n");
        assert_eq!(fs::read_to_string(sample.join("kraken.tsv")).unwrap(), text);
        assert!(!sample.join("kraken.tsv.part").exists());
        let args = fs::read_to_string(sample.join("args.txt")).unwrap();
        assert_eq!(
            args.trim(),
            format!(
                "--db /db/kraken2 --paired --report {} {} {}",
                sample.join("kraken.tsv.part").display(),
                sample.join("S1_R1.fastq").display(),
                sample.join("S1_R2.fastq").display()
            )
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_run_leaves_no_cached_report() {
        let dir = TempDir::new().unwrap();
        let sample = paired_sample(dir.path());
        let processor = fake_kraken(
            dir.path(),
            "printf '5.00\\t608\\t600\\tG\\t561\\tEscherichia\\n' > \"$5\"\necho boom >&2\nexit 1\n",
        );

        assert!(processor.process(&sample).is_none());
        assert!(!sample.join("kraken.tsv").exists());
        assert!(!sample.join("kraken.tsv.part").exists());
        // Nothing is reused on the next attempt either
        assert!(processor.process(&sample).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_report_is_failure() {
        let dir = TempDir::new().unwrap();
        let sample = paired_sample(dir.path());
        let processor = fake_kraken(dir.path(), ": > \"$5\"\n");

        let result = processor.run_classifier(&sample, &sample.join("kraken.tsv"));
        assert!(matches!(result, Err(ClassifierError::EmptyOutput)));
        assert!(!sample.join("kraken.tsv").exists());
        assert!(!sample.join("kraken.tsv.part").exists());
    }

    #[test]
    fn test_reuses_existing_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kraken.tsv"), REPORT).unwrap();

        let text = processor().process(dir.path()).unwrap();
        assert_eq!(text, REPORT);
    }
}
