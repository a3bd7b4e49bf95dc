use anyhow::Result;
use clap::{ArgAction, Parser};
use package_builder::context::{with_output, IoPath};
use package_builder::error::{exit_status, EXIT_USAGE};
use package_builder::logging;
use package_builder::merge::merge_archives;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "merge-rootfs", version)]
#[command(about = "Merge package archives into one rootfs tar, resolving alternatives")]
struct Cli {
    /// Where to write the merged tar (`-` for stdout)
    #[arg(short, long, default_value = "-")]
    output: String,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Package archives (tar or tar.zst), merged in this order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let report = with_output(&IoPath::parse(&cli.output), |out| {
        let (_, report) = merge_archives(cli.inputs.as_slice(), out)?;
        Ok(report)
    })?;

    let entries: u64 = report.inputs.iter().map(|input| input.entries).sum();
    log::info!(
        "merged {} archive(s), {entries} entries, {} alternative link(s)",
        report.inputs.len(),
        report.links.len()
    );
    if !report.unresolved.is_empty() {
        log::warn!("unresolved alternatives: {}", report.unresolved.join(", "));
    }
    Ok(())
}
