mod graph;
mod io;
mod order;
mod plugins;
mod report;
mod rules;

use crate::io::settings::{Settings, SETTINGS_FILE};
use crate::order::{LoadOrder, Options};
use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use owo_colors::OwoColorize;
use shadow_rs::shadow;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};

shadow!(build);

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// A load-order expert for Morrowind-era plugins: computes a total order
/// over the installed plugins that satisfies a corpus of ordering rules,
/// reports conflicts and missing dependencies, and can commit the order by
/// rewriting file modification times.
#[derive(Parser)]
#[clap(name = "load_order", version = build::PKG_VERSION, long_version = build::VERSION)]
#[clap(about = "Sorts a plugin load order against a corpus of ordering rules.")]
struct Args {
    /// Sort all plugins in the plugin directory, not just the active ones.
    #[clap(short = 'a', long = "all")]
    all: bool,

    /// Compute and report only; never commit the new order. Overrides
    /// --update.
    #[clap(short = 'c', long = "check")]
    check: bool,

    /// Emit a debug trace on stderr.
    #[clap(short = 'd', long = "debug")]
    debug: bool,

    /// Print the transitive successors of NAME in the constraint graph.
    #[clap(short = 'e', long = "explain", value_name = "NAME")]
    explain: Option<String>,

    /// Read the active plugin list from the FILE arguments instead of the
    /// game configuration.
    #[clap(short = 'f', long = "fromfile", requires = "files")]
    fromfile: bool,

    /// Emit a parser trace on stderr.
    #[clap(short = 'p', long = "parsedebug")]
    parsedebug: bool,

    /// Suppress [NOTE] diagnostics.
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,

    /// Commit the computed order by rewriting modification times.
    #[clap(short = 'u', long = "update")]
    update: bool,

    /// Suppress the proposed-order listing.
    #[clap(short = 'w', long = "warningsonly")]
    warningsonly: bool,

    /// Plugin list files read with --fromfile.
    #[clap(value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse_from(wild::args_os());

    let level = if args.parsedebug {
        LevelFilter::Trace
    } else if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(e) =
        TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
    {
        eprintln!("unable to initialize logging: {}", e);
    }

    if let Err(e) = run(&args) {
        eprintln!("{}", format!("Error: {:?}", e).bright_red());
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let settings = Settings::load(Path::new(SETTINGS_FILE))?;
    let options = || Options {
        all_plugins: args.all,
        update: args.update && !args.check,
        quiet: args.quiet,
        warnings_only: args.warningsonly,
        explain: args.explain.clone(),
    };

    if args.fromfile {
        for file in &args.files {
            LoadOrder::new(options()).update(Some(file), &settings)?;
        }
    } else {
        LoadOrder::new(options()).update(None, &settings)?;
    }
    Ok(())
}
