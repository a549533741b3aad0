use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::dat::OUTPUT_DIR_NAME;
use crate::error::{HplTuneError, Result};

#[cfg(test)]
mod tests {

    use super::*;
    use std::fs::create_dir_all;

    // a run log whose metrics line sits at the fixed offset
    fn write_log(dir: &Path, name: &str, result_line: &str) {
        let mut contents = String::new();
        for i in 1..RESULT_LINE {
            contents.push_str(&format!("benchmark preamble line {}\n", i));
        }
        contents.push_str(result_line);
        contents.push('\n');
        fs::write(dir.join(name), contents).unwrap();
    }

    fn result_line(n: usize, nb: usize, time: f64, gflops: &str) -> String {
        format!("WR11C2R4 {} {} 8 9 {} {}", n, nb, time, gflops)
    }

    #[test]
    fn parse_keeps_the_full_scientific_notation_value() {
        let r = parse_result_line("WR11C2R4 35000 128 8 9 263.64 1.081e+02").unwrap();
        assert_eq!(r.n, 35000);
        assert_eq!(r.nb, 128);
        assert_eq!(r.time, 263.64);
        // the exponent must survive parsing: 1.081e+02 is 108.1, not 1.081
        assert_eq!(r.gflops, 108.1);
    }

    #[test]
    fn short_lines_are_malformed() {
        assert!(parse_result_line("WR11C2R4 35000 128").is_err());
        assert!(parse_result_line("").is_err());
    }

    #[test]
    fn non_numeric_fields_are_malformed() {
        assert!(parse_result_line("WR11C2R4 NaNN 128 8 9 263.64 1.081e+02").is_err());
        assert!(parse_result_line("WR11C2R4 35000 128 8 9 263.64 fast").is_err());
        assert!(parse_result_line("WR11C2R4 35000 128 8 9 263.64 inf").is_err());
    }

    #[test]
    fn collect_groups_by_configuration_directory() {
        let root = tempfile::tempdir().unwrap();
        let out_a = root.path().join("NB128_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        let out_b = root.path().join("NB96_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        create_dir_all(&out_a).unwrap();
        create_dir_all(&out_b).unwrap();

        write_log(&out_a, "run1.log", &result_line(9984, 128, 200.0, "1.5e+02"));
        write_log(&out_a, "run2.log", &result_line(9984, 128, 210.0, "2.0e+01"));
        write_log(&out_b, "run1.log", &result_line(9984, 96, 250.0, "9.0e+01"));

        let groups = collect(root.path()).unwrap();
        assert!(groups.skipped.is_empty());
        assert_eq!(groups.groups.len(), 2);
        assert_eq!(groups.groups["NB128_N9984_P8_Q9"].len(), 2);
        assert_eq!(groups.groups["NB96_N9984_P8_Q9"].len(), 1);
    }

    #[test]
    fn best_result_uses_full_throughput_values() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("NB128_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        create_dir_all(&out).unwrap();

        // 1.5e+02 = 150 beats 2.0e+01 = 20; mantissa-only parsing would
        // invert the ranking
        write_log(&out, "a.log", &result_line(9984, 128, 200.0, "1.5e+02"));
        write_log(&out, "b.log", &result_line(9984, 128, 210.0, "2.0e+01"));

        let groups = collect(root.path()).unwrap();
        let report = rank("NB128_N9984_P8_Q9", &groups.groups["NB128_N9984_P8_Q9"]).unwrap();
        assert_eq!(report.best.gflops, 150.0);
        assert_eq!(report.sorted.len(), 2);
        assert!(report.sorted[0].gflops >= report.sorted[1].gflops);
    }

    #[test]
    fn one_bad_log_does_not_poison_the_group() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("NB128_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        create_dir_all(&out).unwrap();

        write_log(&out, "good.log", &result_line(9984, 128, 200.0, "1.5e+02"));
        write_log(&out, "short.log", "WR11C2R4 9984");
        fs::write(out.join("tiny.log"), "only one line\n").unwrap();

        let groups = collect(root.path()).unwrap();
        assert_eq!(groups.groups["NB128_N9984_P8_Q9"].len(), 1);
        assert_eq!(groups.skipped.len(), 2);
        for err in &groups.skipped {
            assert!(matches!(err, HplTuneError::MalformedResult { .. }));
        }

        let report = rank("NB128_N9984_P8_Q9", &groups.groups["NB128_N9984_P8_Q9"]).unwrap();
        assert_eq!(report.best.gflops, 150.0);
    }

    #[test]
    fn missing_output_directory_skips_only_that_group() {
        let root = tempfile::tempdir().unwrap();
        create_dir_all(root.path().join("NB128_N9984_P8_Q9")).unwrap();
        let out = root.path().join("NB96_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        create_dir_all(&out).unwrap();
        write_log(&out, "run.log", &result_line(9984, 96, 250.0, "9.0e+01"));

        let groups = collect(root.path()).unwrap();
        assert_eq!(groups.groups.len(), 1);
        assert_eq!(groups.skipped.len(), 1);
        assert!(matches!(&groups.skipped[0], HplTuneError::EmptyGroup(d) if d == "NB128_N9984_P8_Q9"));
    }

    #[test]
    fn throughput_ties_keep_the_first_log_by_file_name() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("NB128_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        create_dir_all(&out).unwrap();

        write_log(&out, "bbb.log", &result_line(2000, 128, 210.0, "1.0e+02"));
        write_log(&out, "aaa.log", &result_line(1000, 128, 200.0, "1.0e+02"));

        let groups = collect(root.path()).unwrap();
        let report = rank("NB128_N9984_P8_Q9", &groups.groups["NB128_N9984_P8_Q9"]).unwrap();
        // aaa.log is discovered first, so it wins the tie
        assert_eq!(report.best.n, 1000);
        assert_eq!(report.sorted[0].n, 1000);
    }

    #[test]
    fn sorted_is_a_descending_permutation() {
        let results: Vec<RunResult> = [30.0, 10.0, 20.0]
            .iter()
            .map(|&g| RunResult {
                n: 9984,
                nb: 128,
                time: 100.0,
                gflops: g,
                raw_line: String::new(),
            })
            .collect();

        let report = rank("d", &results).unwrap();
        assert_eq!(report.best.gflops, 30.0);
        let sorted: Vec<f64> = report.sorted.iter().map(|r| r.gflops).collect();
        assert_eq!(sorted, vec![30.0, 20.0, 10.0]);
    }

    #[test]
    fn empty_group_is_an_error() {
        assert!(matches!(
            rank("NB128_N9984_P8_Q9", &[]),
            Err(HplTuneError::EmptyGroup(_))
        ));
    }

    #[test]
    fn report_lists_groups_and_skipped_files() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("NB128_N9984_P8_Q9").join(OUTPUT_DIR_NAME);
        create_dir_all(&out).unwrap();
        write_log(&out, "good.log", &result_line(9984, 128, 200.0, "1.5e+02"));
        write_log(&out, "bad.log", "garbage");

        let groups = collect(root.path()).unwrap();
        let (reports, warnings) = rank_all(&groups);
        let text = render_report(&reports, &groups.skipped);

        assert!(warnings.is_empty());
        assert!(text.contains("==== NB128_N9984_P8_Q9 ===="));
        assert!(text.contains("best:"));
        assert!(text.contains("skipped:"));
        assert!(text.contains("bad.log"));
    }

    #[test]
    fn missing_root_is_fatal() {
        assert!(collect(Path::new("/no/such/tree")).is_err());
    }
}

// versioned contract with the benchmark's report format: the metrics line
// and its whitespace-delimited field positions. Format drift in the external
// tool only ever touches these constants and parse_result_line below.
const RESULT_LINE: usize = 49; // 1-indexed
const FIELD_N: usize = 1;
const FIELD_NB: usize = 2;
const FIELD_TIME: usize = 5;
const FIELD_GFLOPS: usize = 6;
const MIN_FIELDS: usize = 7;

/// metrics extracted from one run log
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub n: usize,
    pub nb: usize,
    pub time: f64,
    pub gflops: f64,
    /// the metrics line exactly as it appeared in the log
    pub raw_line: String,
}

/// results grouped by configuration directory, plus everything that had to
/// be skipped to build them. Group order and per-group file order are stable
/// so tie-breaks are reproducible across passes.
#[derive(Debug, Default)]
pub struct ResultGroups {
    pub groups: BTreeMap<String, Vec<RunResult>>,
    pub skipped: Vec<HplTuneError>,
}

/// best result of one group plus the group's full descending leaderboard
#[derive(Debug, Clone)]
pub struct RankedReport {
    pub best: RunResult,
    pub sorted: Vec<RunResult>,
}

/// parses the fixed metrics line of one run log. The full scientific-notation
/// throughput value is kept, exponent included.
fn parse_result_line(line: &str) -> std::result::Result<RunResult, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return Err(format!(
            "expected at least {} fields, found {}",
            MIN_FIELDS,
            fields.len()
        ));
    }

    let n = fields[FIELD_N]
        .parse::<usize>()
        .map_err(|_| format!("non-numeric N field '{}'", fields[FIELD_N]))?;
    let nb = fields[FIELD_NB]
        .parse::<usize>()
        .map_err(|_| format!("non-numeric NB field '{}'", fields[FIELD_NB]))?;
    let time = fields[FIELD_TIME]
        .parse::<f64>()
        .map_err(|_| format!("non-numeric time field '{}'", fields[FIELD_TIME]))?;
    let gflops = fields[FIELD_GFLOPS]
        .parse::<f64>()
        .map_err(|_| format!("non-numeric throughput field '{}'", fields[FIELD_GFLOPS]))?;

    if !time.is_finite() || !gflops.is_finite() {
        return Err("non-finite metric".to_string());
    }

    Ok(RunResult {
        n,
        nb,
        time,
        gflops,
        raw_line: line.to_string(),
    })
}

fn extract_result(log_path: &Path) -> Result<RunResult> {
    let malformed = |reason: String| HplTuneError::MalformedResult {
        path: log_path.to_path_buf(),
        reason,
    };
    let contents =
        fs::read_to_string(log_path).map_err(|e| malformed(format!("unreadable log: {}", e)))?;
    let line = contents
        .lines()
        .nth(RESULT_LINE - 1)
        .ok_or_else(|| malformed(format!("log has fewer than {} lines", RESULT_LINE)))?;
    parse_result_line(line).map_err(malformed)
}

/// walks the configuration tree and gathers one record per parsable run log.
/// A bad log only skips itself; a directory without run output is recorded
/// and skipped. Directories and files are visited in name order.
pub fn collect(root: impl AsRef<Path>) -> Result<ResultGroups> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(HplTuneError::InvalidInput(format!(
            "results root '{}' is not a directory",
            root.display()
        )));
    }

    let mut out = ResultGroups::default();

    for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                out.skipped.push(walk_error(root, err));
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().to_string();

        let output_dir = entry.path().join(OUTPUT_DIR_NAME);
        if !output_dir.is_dir() {
            out.skipped.push(HplTuneError::EmptyGroup(dir_name));
            continue;
        }

        let mut results = vec![];
        for log in WalkDir::new(&output_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let log = match log {
                Ok(log) => log,
                Err(err) => {
                    out.skipped.push(walk_error(&output_dir, err));
                    continue;
                }
            };
            if !log.file_type().is_file() {
                continue;
            }
            match extract_result(log.path()) {
                Ok(result) => results.push(result),
                Err(err) => out.skipped.push(err),
            }
        }
        out.groups.insert(dir_name, results);
    }

    Ok(out)
}

fn walk_error(path: &Path, err: walkdir::Error) -> HplTuneError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf());
    let source = err.into_io_error().unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
    });
    HplTuneError::Io { path, source }
}

/// ranks one configuration group. Ties on throughput keep the first record
/// encountered, which is deterministic because collection orders logs by
/// file name.
pub fn rank(dir_name: &str, results: &[RunResult]) -> Result<RankedReport> {
    let best = results
        .iter()
        .reduce(|best, r| if r.gflops > best.gflops { r } else { best })
        .cloned()
        .ok_or_else(|| HplTuneError::EmptyGroup(dir_name.to_string()))?;

    let mut sorted = results.to_vec();
    // stable sort, so equal throughputs keep discovery order
    sorted.sort_by(|a, b| b.gflops.partial_cmp(&a.gflops).unwrap_or(std::cmp::Ordering::Equal));

    Ok(RankedReport { best, sorted })
}

/// ranks every group, preserving directory identity in stable order. Empty
/// groups become warnings instead of aborting the pass.
pub fn rank_all(groups: &ResultGroups) -> (Vec<(String, RankedReport)>, Vec<HplTuneError>) {
    let mut reports = vec![];
    let mut warnings = vec![];
    for (dir_name, results) in &groups.groups {
        match rank(dir_name, results) {
            Ok(report) => reports.push((dir_name.clone(), report)),
            Err(err) => warnings.push(err),
        }
    }
    (reports, warnings)
}

/// renders the ranking report: per configuration directory a best-result
/// section followed by the full leaderboard, then everything that was
/// skipped, so a partial sweep is distinguishable from a clean one.
pub fn render_report(reports: &[(String, RankedReport)], skipped: &[HplTuneError]) -> String {
    let mut out = String::new();
    for (dir_name, report) in reports {
        let _ = writeln!(out, "==== {} ====", dir_name);
        let best = &report.best;
        let _ = writeln!(
            out,
            "best: N={} NB={} time={} gflops={:e}",
            best.n, best.nb, best.time, best.gflops
        );
        let _ = writeln!(out, "all runs (gflops, descending):");
        for r in &report.sorted {
            let _ = writeln!(
                out,
                "  N={} NB={} time={} gflops={:e}",
                r.n, r.nb, r.time, r.gflops
            );
        }
    }
    if !skipped.is_empty() {
        let _ = writeln!(out, "skipped:");
        for err in skipped {
            let _ = writeln!(out, "  {}", err);
        }
    }
    out
}
