use std::fs;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{HplTuneError, Result};
use crate::RunConfig;


/// name of the descriptor file the benchmark reads from its working directory
pub const DAT_FILE_NAME: &str = "HPL.dat";

/// per-configuration subdirectory the scheduler drops run logs into
pub const OUTPUT_DIR_NAME: &str = "output";

// 1-indexed positions of the variable lines in the descriptor
const N_LINE: usize = 6;
const NB_LINE: usize = 8;
const P_LINE: usize = 11;
const Q_LINE: usize = 12;

/// renders the benchmark input descriptor. Only N, NB, P and Q vary per
/// configuration; the tail tuning parameters are fixed template values the
/// benchmark expects verbatim. Whitespace-delimited token order is the
/// contract, column alignment is cosmetic.
pub fn render_dat(n: usize, nb: usize, p: usize, q: usize) -> String {
    format!(
        "\
HPLinpack benchmark input file
Innovative Computing Laboratory, University of Tennessee
HPL.out      output file name (if any)
6            device out (6=stdout,7=stderr,file)
1            # of problems sizes (N)
{n}        Ns
1            # of NBs
{nb}          NBs
0            PMAP process mapping (0=Row-,1=Column-major)
1            # of process grids (P x Q)
{p}            Ps
{q}            Qs
16.0         threshold
1            # of panel fact
0            PFACTs (0=left, 1=Crout, 2=Right)
1            # of recursive stopping criterium
4            NBMINs (>= 1)
1            # of panels in recursion
2            NDIVs
1            # of recursive panel fact.
2            RFACTs (0=left, 1=Crout, 2=Right)
1            # of broadcast
0            BCASTs (0=1rg,1=1rM,2=2rg,3=2rM,4=Lng,5=LnM)
1            # of lookahead depth
0            DEPTHs (>=0)
2            SWAP (0=bin-exch,1=long,2=mix)
128          swapping threshold
0            L1 in (0=transposed,1=no-transposed) form
0            U  in (0=transposed,1=no-transposed) form
1            Equilibration (0=no,1=yes)
8            memory alignment in double (> 0)
"
    )
}

/// extracts (N, NB, P, Q) back out of a rendered descriptor
pub fn parse_dat(contents: &str) -> Result<(usize, usize, usize, usize)> {
    let field = |line_no: usize| -> Result<usize> {
        contents
            .lines()
            .nth(line_no - 1)
            .and_then(|line| line.split_whitespace().next())
            .and_then(|tok| tok.parse().ok())
            .ok_or_else(|| {
                HplTuneError::InvalidInput(format!(
                    "descriptor line {} is missing or non-numeric",
                    line_no
                ))
            })
    };
    Ok((field(N_LINE)?, field(NB_LINE)?, field(P_LINE)?, field(Q_LINE)?))
}

/// outcome of one materialization pass
#[derive(Debug, Default)]
pub struct MaterializeSummary {
    pub created: usize,
    pub existing: usize,
}

/// creates one directory per run configuration under `root` and writes its
/// descriptor. An existing directory is skipped, not an error, so re-planning
/// an already-populated tree only refreshes the descriptor files.
pub fn materialize(root: impl AsRef<Path>, configs: &[RunConfig]) -> Result<MaterializeSummary> {
    let root = root.as_ref();
    fs::create_dir_all(root).map_err(|e| HplTuneError::from_fs(root, e))?;

    let mut summary = MaterializeSummary::default();

    let prog_bar = ProgressBar::new(configs.len() as u64);
    prog_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    for config in configs {
        let dir = root.join(&config.dir_name);
        match fs::create_dir(&dir).map_err(|e| HplTuneError::from_fs(&dir, e)) {
            Ok(()) => summary.created += 1,
            Err(HplTuneError::FilesystemConflict(_)) => summary.existing += 1,
            Err(other) => return Err(other),
        }

        // the scheduler redirects each run's report here
        let output_dir = dir.join(OUTPUT_DIR_NAME);
        fs::create_dir_all(&output_dir).map_err(|e| HplTuneError::from_fs(&output_dir, e))?;

        let contents = render_dat(config.point.n, config.point.nb, config.grid.p, config.grid.q);
        write_atomic(&dir.join(DAT_FILE_NAME), &contents)?;
        prog_bar.inc(1);
    }
    prog_bar.finish();

    Ok(summary)
}

// temp-write-then-rename so an interrupted run never leaves a partial
// descriptor for the benchmark to trip over
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("dat.tmp");
    fs::write(&tmp, contents).map_err(|e| HplTuneError::from_fs(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| HplTuneError::from_fs(path, e))?;
    Ok(())
}
