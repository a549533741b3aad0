use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hpltune::error::Result;
use hpltune::slurm::{self, JobCollection, Sbatch, Scheduler};
use hpltune::{Plan, PLAN_FILE_NAME};

#[derive(clap::Parser)]
struct Args {
    /// root of a materialized configuration tree
    root: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let plan = Plan::from_file(args.root.join(PLAN_FILE_NAME))?;
    let configs = plan.run_configs();

    slurm::write_dirs_index(&args.root, &configs)?;
    let task = slurm::array_task(&args.root, &plan, configs.len());

    if slurm::is_installed() {
        let job_id = Sbatch.submit(&task)?;
        println!("submitted array job {}", job_id);
        for (id, state) in JobCollection::from_id(job_id).state() {
            println!("job {}: {}", id, state);
        }
    } else {
        println!("slurm not found, batch script follows:");
        print!("{}", task.render());
    }
    Ok(())
}
