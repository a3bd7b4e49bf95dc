use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use package_builder::buildscript::BuildScript;
use package_builder::config::{resolve_arch, PackagerConfig};
use package_builder::context::{IoPath, RunContext};
use package_builder::error::{exit_status, EXIT_USAGE};
use package_builder::listing::{write_listing, Listing};
use package_builder::source::bundle_sources;
use package_builder::source::fetch::HttpFetcher;
use package_builder::{logging, ArchPair};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "package-builder", version)]
#[command(about = "Compile package descriptors into source bundles and build makefiles")]
struct Cli {
    /// Descriptor to read (`-` for stdin)
    #[arg(short, long, default_value = "-", global = true)]
    input: String,

    /// Where to write results (`-` for stdout)
    #[arg(short, long, default_value = "-", global = true)]
    output: String,

    /// Architecture of the host
    #[arg(long, env = "HOSTARCH", global = true)]
    host: Option<String>,

    /// Architecture of the target system
    #[arg(long = "build", env = "BUILDARCH", global = true)]
    build_arch: Option<String>,

    /// Config file (defaults to the per-user config if present)
    #[arg(long, env = "PACKAGE_BUILDER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List build dependencies
    #[command(visible_aliases = ["bd", "bdeps"])]
    Builddeps {
        #[arg(short, long, aliases = ["sep", "seperator"], default_value = "\n")]
        separator: String,
    },
    /// List packages, sorted
    Pkgs {
        #[arg(short, long, aliases = ["sep", "seperator"], default_value = "\n")]
        separator: String,
    },
    /// List dependencies of one package
    #[command(visible_aliases = ["d", "dep"])]
    Deps {
        /// Package to list dependencies of
        #[arg(short, long, alias = "pkg")]
        package: Option<String>,
        #[arg(short, long, aliases = ["sep", "seperator"], default_value = "\n")]
        separator: String,
    },
    /// Print the builder identity
    Builder,
    /// Bundle sources and package metadata into a tar archive
    #[command(visible_alias = "src")]
    Source,
    /// Generate the build makefile
    Build,
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

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = PackagerConfig::discover(cli.config.as_deref())?;
    let ctx = RunContext {
        input: IoPath::parse(&cli.input),
        output: IoPath::parse(&cli.output),
        arch: ArchPair::new(
            resolve_arch(cli.host.as_deref(), config.host_arch.as_deref())?,
            resolve_arch(cli.build_arch.as_deref(), config.build_arch.as_deref())?,
        ),
        default_builder: config.default_builder().to_string(),
    };
    log::debug!("host {} build {}", ctx.arch.host, ctx.arch.build);

    let descriptor = ctx.load_descriptor()?;
    match cli.cmd {
        Command::Builddeps { separator } => {
            write_listing(&ctx, &descriptor, &Listing::BuildDependencies, &separator)
        }
        Command::Pkgs { separator } => {
            write_listing(&ctx, &descriptor, &Listing::Packages, &separator)
        }
        Command::Deps { package, separator } => write_listing(
            &ctx,
            &descriptor,
            &Listing::Dependencies { package },
            &separator,
        ),
        Command::Builder => ctx.with_output(|out| {
            out.write_all(descriptor.builder.as_bytes())
                .context("writing builder")
        }),
        Command::Source => {
            let expanded = descriptor.expand(&ctx.arch)?;
            let fetcher = HttpFetcher::new()?;
            ctx.with_output(|out| {
                bundle_sources(&expanded, &fetcher, out)?;
                Ok(())
            })
        }
        Command::Build => {
            let expanded = descriptor.expand(&ctx.arch)?;
            ctx.with_output(|out| BuildScript::from_descriptor(&expanded).write_to(out))
        }
    }
}
