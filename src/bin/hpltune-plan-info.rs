use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hpltune::{Plan, PLAN_FILE_NAME};

#[derive(clap::Parser)]
struct Args {
    /// root of a materialized configuration tree
    root: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let plan = match Plan::from_file(args.root.join(PLAN_FILE_NAME)) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    println!("nodes: {}", plan.cluster.nodes);
    println!("cores per node: {}", plan.cluster.cores_per_node);
    println!("mem per node: {} GiB", plan.cluster.mem_per_node_gib);
    println!("total cores: {}", plan.cluster.total_cores());
    println!("process grid: {} x {}", plan.grid.p, plan.grid.q);
    println!("sweep points: {}", plan.points.len());
    println!("time limit: {} h", plan.time_limit_hours);
    ExitCode::SUCCESS
}
