use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hpltune::{dat, error::Result, ClusterSpec, Plan, PLAN_FILE_NAME};

#[derive(clap::Parser)]
struct Args {
    nodes: usize,
    cores_per_node: usize,
    mem_per_node_gib: f64,
    /// parent directory the configuration tree is created under
    #[clap(short = 'o', long, default_value = "test_runs")]
    root: PathBuf,
    /// wall-clock limit handed to the scheduler at launch
    #[clap(long, default_value_t = 4)]
    time_limit_hours: usize,
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
    let cluster = ClusterSpec::new(args.nodes, args.cores_per_node, args.mem_per_node_gib)?;
    let plan = Plan::new(cluster, args.time_limit_hours)?;

    println!(
        "For {} nodes, {} cores per node, and {}GiB of memory per node:",
        cluster.nodes, cluster.cores_per_node, cluster.mem_per_node_gib
    );
    for point in &plan.points {
        println!("NB: {}    N: {}", point.nb, point.n);
    }
    println!("total cores: {}", cluster.total_cores());
    println!("Best P: {}", plan.grid.p);
    println!("Best Q: {}", plan.grid.q);

    let zero_points = plan.points.iter().filter(|p| p.n == 0).count();
    if zero_points > 0 {
        println!(
            "warning: {} sweep points have zero problem size, the cluster memory is too small for their blocking factors",
            zero_points
        );
    }

    let root = args.root.join(plan.root_label());
    let configs = plan.run_configs();

    println!("materializing {} run configurations ...", configs.len());
    let summary = dat::materialize(&root, &configs)?;
    if summary.existing > 0 {
        println!(
            "{} directories already existed, descriptors refreshed",
            summary.existing
        );
    }

    let plan_file = root.join(PLAN_FILE_NAME);
    plan.to_file(&plan_file)?;
    println!("wrote plan to {}", plan_file.display());
    println!("done.");
    Ok(())
}
