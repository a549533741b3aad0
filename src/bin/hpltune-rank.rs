use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hpltune::error::Result;
use hpltune::results;

#[derive(clap::Parser)]
struct Args {
    /// root of a configuration tree with run output to rank
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
    println!("collecting results from {} ...", args.root.display());
    let groups = results::collect(&args.root)?;
    let (reports, warnings) = results::rank_all(&groups);

    let mut skipped = groups.skipped;
    skipped.extend(warnings);

    print!("{}", results::render_report(&reports, &skipped));
    Ok(())
}
