use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::dat::OUTPUT_DIR_NAME;
use crate::error::{HplTuneError, Result};
use crate::{Plan, RunConfig};

const SBATCH_PREAMBLE: &str = "#!/usr/bin/env bash";

/// side file enumerating configuration directories, one per line, in the
/// order array task ids map onto them
pub const DIRS_INDEX_NAME: &str = ".dirs_list";

/// benchmark binary each array task runs
const BENCH_EXE: &str = "xhpl";

#[cfg(test)]
mod tests {

    use super::*;
    use crate::ClusterSpec;

    fn plan() -> Plan {
        Plan::new(ClusterSpec::new(3, 24, 64.0).unwrap(), 4).unwrap()
    }

    #[test]
    fn array_task_script_carries_the_submission_parameters() {
        let p = plan();
        let configs = p.run_configs();
        let task = array_task(Path::new("/tmp/hpl_sweep_test"), &p, configs.len());
        let script = task.render();

        assert!(script.starts_with(SBATCH_PREAMBLE));
        assert!(script.contains("#SBATCH --array=1-21"));
        assert!(script.contains("#SBATCH --ntasks=72"));
        assert!(script.contains("#SBATCH --time=4:00:00"));
        assert!(script.contains("#SBATCH --mem=65536"));
        assert!(script.contains("#SBATCH --chdir=/tmp/hpl_sweep_test"));
        // each task resolves its own directory from the index file
        assert!(script.contains(DIRS_INDEX_NAME));
        assert!(script.contains("SLURM_ARRAY_TASK_ID"));
        assert!(script.contains("srun xhpl"));
        assert!(script.contains(OUTPUT_DIR_NAME));
    }

    #[test]
    fn options_overwrite_instead_of_duplicating() {
        let task = SlurmTask::new(Path::new("/tmp/t"), "job", 1000)
            .time_limit_hours(4)
            .time_limit_hours(8);
        let script = task.render();
        assert_eq!(script.matches("#SBATCH --time=").count(), 1);
        assert!(script.contains("#SBATCH --time=8:00:00"));
    }

    #[test]
    fn partitions_accumulate() {
        let task = SlurmTask::new(Path::new("/tmp/t"), "job", 1000)
            .partition("compute")
            .partition("all");
        assert!(task.render().contains("#SBATCH --partition=compute,all"));
    }

    #[test]
    fn dirs_index_lists_configs_in_plan_order() {
        let dir = tempfile::tempdir().unwrap();
        let p = plan();
        let configs = p.run_configs();
        let path = write_dirs_index(dir.path(), &configs).unwrap();

        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), configs.len());
        assert_eq!(lines[0], configs[0].dir_name);
        assert_eq!(lines[20], configs[20].dir_name);
    }

    #[test]
    fn job_id_parses_from_sbatch_response() {
        assert_eq!(parse_job_id("Submitted batch job 209\n").unwrap(), 209);
        assert!(parse_job_id("something went wrong\n").is_err());
    }

    #[test]
    fn fake_scheduler_satisfies_the_submission_seam() {
        struct Fake;
        impl Scheduler for Fake {
            fn submit(&self, _task: &SlurmTask) -> Result<u64> {
                Ok(42)
            }
        }
        let task = SlurmTask::new(Path::new("/tmp/t"), "job", 1000);
        assert_eq!(Fake.submit(&task).unwrap(), 42);
    }

    #[test]
    fn job_states_parse_from_scheduler_strings() {
        assert_eq!(JobState::from_str("RUNNING"), JobState::Running);
        assert_eq!(JobState::from_str("completed"), JobState::Completed);
        assert_eq!(JobState::from_str("whatever"), JobState::Unknown);
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl JobState {
    pub fn from_str(state_str: &str) -> Self {
        match state_str.to_ascii_lowercase().as_str() {
            "pending" => JobState::Pending,
            "cancelled" => JobState::Cancelled,
            "failed" => JobState::Failed,
            "running" => JobState::Running,
            "completed" => JobState::Completed,
            _ => JobState::Unknown,
        }
    }
}

#[derive(Clone)]
pub enum SBatchOption {
    /// Name for the job
    JobName(String),
    /// Memory required per node to run
    MemoryMB(usize),
    /// Directory where standard out will be written to
    Output(PathBuf),
    /// Names of the partitions to be considered when scheduling the job
    Partitions(Vec<String>),
    /// Total task count the benchmark is launched with
    NTasks(usize),
    /// Wall-clock limit in whole hours
    TimeLimitHours(usize),
    /// Directory the job starts in
    WorkDir(PathBuf),
    /// array job with a range of task ids
    Array { start_id: usize, end_id: usize },
}

impl SBatchOption {
    fn format(&self) -> String {
        match &self {
            SBatchOption::JobName(name) => format!("#SBATCH --job-name={}", name),
            SBatchOption::MemoryMB(megabytes) => format!("#SBATCH --mem={}", megabytes),
            SBatchOption::Output(directory) => format!(
                "#SBATCH --output={}",
                directory
                    .join("slurm-%A_%a")
                    .with_extension("out")
                    .to_string_lossy()
            ),
            SBatchOption::Partitions(partition_names) => {
                format!("#SBATCH --partition={}", partition_names.join(","))
            }
            SBatchOption::NTasks(n) => format!("#SBATCH --ntasks={}", n),
            SBatchOption::TimeLimitHours(hours) => format!("#SBATCH --time={}:00:00", hours),
            SBatchOption::WorkDir(dir) => {
                format!("#SBATCH --chdir={}", dir.to_string_lossy())
            }
            SBatchOption::Array { start_id, end_id } => {
                format!("#SBATCH --array={}-{}", start_id, end_id)
            }
        }
    }

    // unique identifier used in a hashmap to overwrite options
    fn u_id(&self) -> u16 {
        match &self {
            SBatchOption::JobName(_) => 0,
            SBatchOption::MemoryMB(_) => 1,
            SBatchOption::Output(_) => 2,
            SBatchOption::Partitions(_) => 3,
            SBatchOption::NTasks(_) => 4,
            SBatchOption::TimeLimitHours(_) => 5,
            SBatchOption::WorkDir(_) => 6,
            SBatchOption::Array { .. } => 7,
        }
    }
}

pub struct SlurmTask {
    script: PathBuf,
    options: HashMap<u16, SBatchOption>,
    lines: Vec<String>,
}

impl SlurmTask {
    pub fn new(write_dir: &Path, job_name: &str, memory_megabytes: usize) -> Self {
        use SBatchOption::*;
        let mut options = HashMap::<u16, SBatchOption>::new();
        let jobname = JobName(job_name.to_string());
        let mem = MemoryMB(memory_megabytes);
        let output = Output(write_dir.to_path_buf());

        options.insert(jobname.u_id(), jobname);
        options.insert(mem.u_id(), mem);
        options.insert(output.u_id(), output);

        let script = write_dir.join(job_name).with_extension("bash");

        Self {
            script,
            options,
            lines: vec![],
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// append a command to the batch script
    pub fn command(self, cmd: Command) -> Self {
        self.line(format!("{:?}", cmd))
    }

    /// append a raw line to the batch script, for shell constructs a
    /// Command cannot express
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    /// total task count handed to srun
    pub fn ntasks(self, n: usize) -> Self {
        self.add_opt(SBatchOption::NTasks(n))
    }

    /// wall-clock limit in whole hours
    pub fn time_limit_hours(self, hours: usize) -> Self {
        self.add_opt(SBatchOption::TimeLimitHours(hours))
    }

    /// directory the job starts in
    pub fn workdir(self, dir: &Path) -> Self {
        self.add_opt(SBatchOption::WorkDir(dir.to_owned()))
    }

    pub fn array(self, start_id: usize, end_id: usize) -> Self {
        self.add_opt(SBatchOption::Array { start_id, end_id })
    }

    /// specify one of many possible partitions for the task. Calling this
    /// method again appends to the partition list
    pub fn partition(self, partition_name: &str) -> Self {
        if let Some(part) = self.options.get(&3) {
            if let SBatchOption::Partitions(mut parts) = part.to_owned() {
                parts.push(partition_name.to_string());
                self.add_opt(SBatchOption::Partitions(parts))
            } else {
                panic!("expecting field to be partition!")
            }
        } else {
            self.add_opt(SBatchOption::Partitions(vec![partition_name.to_string()]))
        }
    }

    fn add_opt(mut self, opt: SBatchOption) -> Self {
        self.options.insert(opt.u_id(), opt);
        self
    }

    pub fn render(&self) -> String {
        let mut lines = vec![];
        lines.push(SBATCH_PREAMBLE.to_string());
        // fixed option order so re-rendering a task is byte-stable
        let mut options: Vec<_> = self.options.iter().collect();
        options.sort_by_key(|(u_id, _)| **u_id);
        options
            .iter()
            .for_each(|(_, opt)| lines.push(opt.format()));
        lines.extend(self.lines.iter().cloned());
        let mut str = lines.join("\n");
        str.push('\n');
        str
    }

    /// writes the batch script so a failed submission can be inspected or
    /// submitted by hand
    pub fn write_script(&self) -> Result<()> {
        let dir = self.script.parent().expect("script should have a parent dir");
        if !dir.exists() {
            create_dir_all(dir).map_err(|e| HplTuneError::from_fs(dir, e))?;
        }
        fs::write(&self.script, self.render())
            .map_err(|e| HplTuneError::from_fs(&self.script, e))?;
        Ok(())
    }
}

/// submission seam between the planning core and the batch system: tests
/// stand in a fake, production hands the script to sbatch
pub trait Scheduler {
    fn submit(&self, task: &SlurmTask) -> Result<u64>;
}

pub struct Sbatch;

impl Scheduler for Sbatch {
    fn submit(&self, task: &SlurmTask) -> Result<u64> {
        task.write_script()?;
        let output = Command::new("sbatch")
            .arg(task.script_path())
            .output()
            .map_err(|e| HplTuneError::Scheduler(format!("failed to run sbatch: {}", e)))?;
        if !output.status.success() {
            return Err(HplTuneError::Scheduler(format!(
                "sbatch failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        parse_job_id(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_job_id(resp: &str) -> Result<u64> {
    let nums: Vec<u64> = resp
        .split(' ')
        .flat_map(|str| str.replace('\n', "").parse())
        .collect();
    match nums.as_slice() {
        [id] => Ok(*id),
        [] => Err(HplTuneError::Scheduler(
            "no job id found in slurm response".to_string(),
        )),
        _ => Err(HplTuneError::Scheduler(
            "multiple ids found in slurm response".to_string(),
        )),
    }
}

/// writes the directory-index side file: line k is the directory array
/// task k runs in (task ids are 1-based)
pub fn write_dirs_index(root: impl AsRef<Path>, configs: &[RunConfig]) -> Result<PathBuf> {
    let path = root.as_ref().join(DIRS_INDEX_NAME);
    let mut contents = configs
        .iter()
        .map(|c| c.dir_name.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    contents.push('\n');
    fs::write(&path, contents).map_err(|e| HplTuneError::from_fs(&path, e))?;
    Ok(path)
}

/// builds the array job for a materialized plan: each task looks up its
/// directory in the index file, runs the benchmark there, and captures the
/// report in that directory's output subdir
pub fn array_task(root: &Path, plan: &Plan, n_configs: usize) -> SlurmTask {
    let mem_mb = (plan.cluster.mem_per_node_gib * 1024.0) as usize;
    SlurmTask::new(root, "hpl_sweep", mem_mb)
        .ntasks(plan.cluster.total_cores())
        .time_limit_hours(plan.time_limit_hours)
        .workdir(root)
        .array(1, n_configs)
        .line(format!(
            "task_dir=$(sed -n \"${{SLURM_ARRAY_TASK_ID}}p\" {})",
            DIRS_INDEX_NAME
        ))
        .line("cd \"$task_dir\"")
        .line(format!(
            "srun {} > \"{}/{}_${{SLURM_JOB_ID}}_${{SLURM_ARRAY_TASK_ID}}.log\"",
            BENCH_EXE, OUTPUT_DIR_NAME, BENCH_EXE
        ))
}

/*
simple check to see that slurm is installed on the system
sinfo -V
*/
pub fn is_installed() -> bool {
    let mut cmd = Command::new("sinfo");
    cmd.arg("-V");

    cmd.output().is_ok()
}

pub struct JobCollection {
    job_ids: Vec<u64>,
}

impl JobCollection {
    pub fn from_id(job_id: u64) -> Self {
        Self {
            job_ids: vec![job_id],
        }
    }

    pub fn from_iter(i: impl IntoIterator<Item = u64>) -> Self {
        Self {
            job_ids: i.into_iter().collect(),
        }
    }

    /// current state of every job in the collection. squeue only knows
    /// queued and running jobs, so anything it can't name is retried
    /// through the accounting database.
    pub fn state(&self) -> HashMap<u64, JobState> {
        let mut states = Self::job_state_squeue(&self.job_ids);
        let remaining: Vec<u64> = states
            .iter()
            .filter_map(|(id, state)| (*state == JobState::Unknown).then_some(*id))
            .collect();
        if !remaining.is_empty() {
            for (id, state) in Self::job_state_sacct(&remaining) {
                states.insert(id, state);
            }
        }
        states
    }

    fn all_unknown(job_ids: &[u64]) -> HashMap<u64, JobState> {
        job_ids.iter().map(|id| (*id, JobState::Unknown)).collect()
    }

    fn job_state_sacct(job_ids: &[u64]) -> HashMap<u64, JobState> {
        let jid_str = job_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut cmd = Command::new("sacct");
        cmd.args([
            "--parsable2",
            "--noheader",
            "--format=job,state",
            "-j",
            jid_str.as_str(),
        ]);

        let output = match cmd.output() {
            Ok(o) if o.status.success() => o,
            _ => return Self::all_unknown(job_ids),
        };

        let mut states = Self::all_unknown(job_ids);
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if let Some((id_str, state_str)) = line.split_once('|') {
                // only plain job ids count, array-step extensions are skipped
                if let Ok(job_id) = id_str.parse::<u64>() {
                    states.insert(job_id, JobState::from_str(state_str));
                }
            }
        }
        states
    }

    fn job_state_squeue(job_ids: &[u64]) -> HashMap<u64, JobState> {
        let mut cmd = Command::new("squeue");
        cmd.arg("--json");

        let output = match cmd.output() {
            Ok(o) if o.status.success() => o,
            _ => return Self::all_unknown(job_ids),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = match serde_json::from_str(&stdout) {
            Ok(v) => v,
            Err(_) => return Self::all_unknown(job_ids),
        };
        let jobs = match parsed.get("jobs").and_then(Value::as_array) {
            Some(jobs) => jobs,
            None => return Self::all_unknown(job_ids),
        };

        let mut by_id = HashMap::<u64, &Value>::with_capacity(jobs.len());
        for job in jobs {
            if let Some(id) = job.get("job_id").and_then(Value::as_u64) {
                by_id.insert(id, job);
            }
        }

        job_ids
            .iter()
            .map(|id| {
                let state = by_id
                    .get(id)
                    .and_then(|job| job.get("job_state"))
                    .and_then(Value::as_str)
                    .map(JobState::from_str)
                    .unwrap_or(JobState::Unknown);
                (*id, state)
            })
            .collect()
    }
}
