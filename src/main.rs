use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::Result;
use tracing::Level;

use nla::config::{DEFAULT_ENTRY, DEFAULT_MEMORY_SIZE, DEFAULT_ROOT};
use nla::{Config, Exit, Machine, Program};

/// nla assembles and runs programs for a tiny register machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a root directory to boot from
    #[arg(env = "NLA_ROOT")]
    root: Option<PathBuf>,

    /// Maximum level of log messages written to stderr
    #[arg(long, global = true, default_value_t = Level::WARN)]
    log_level: Level,
}

#[derive(Subcommand)]
enum Command {
    /// Boot a machine from a root directory and run it until it halts
    Run {
        /// Directory program files are loaded from
        #[arg(env = "NLA_ROOT", default_value = DEFAULT_ROOT)]
        root: PathBuf,
        /// File to boot, relative to the root
        #[arg(short, long, default_value = DEFAULT_ENTRY)]
        entry: String,
        /// Number of memory cells
        #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
        memory: usize,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Assemble a program without running it
    Check {
        /// Directory program files are loaded from
        #[arg(env = "NLA_ROOT", default_value = DEFAULT_ROOT)]
        root: PathBuf,
        /// File to check, relative to the root
        #[arg(short, long, default_value = DEFAULT_ENTRY)]
        entry: String,
    },
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Some(Command::Run {
            root,
            entry,
            memory,
            minimal,
        }) => run(
            &Config {
                root,
                entry,
                memory_size: memory,
            },
            minimal,
        ),
        Some(Command::Check { root, entry }) => {
            message(Green, "Checking", &format!("{}", root.join(&entry).display()));
            let mut machine = Machine::from_config(&Config {
                root,
                entry: entry.clone(),
                ..Default::default()
            });
            machine.load_file(&entry)?;
            let program: &Program = machine.program();
            message(
                Green,
                "Success",
                &format!(
                    "{} statements, {} labels",
                    program.len(),
                    program.label_count()
                ),
            );
            Ok(())
        }
        None => {
            let mut config = Config::default();
            if let Some(root) = args.root {
                config.root = root;
            }
            run(&config, false)
        }
    }
}

fn run(config: &Config, minimal: bool) -> Result<()> {
    let target = format!("{}", config.root.join(&config.entry).display());
    if !minimal {
        message(MsgColor::Green, "Assembling", &target);
        message(MsgColor::Green, "Running", "from first statement");
    }
    let exit = Machine::from_config(config).boot(&config.entry)?;

    if !minimal {
        match exit {
            Exit::Halted => message(MsgColor::Cyan, "Halted", &target),
            Exit::EndOfProgram => message(MsgColor::Green, "Completed", &target),
        }
    }
    Ok(())
}

enum MsgColor {
    Green,
    Cyan,
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
    };
    eprintln!("{left:>12} {right}");
}
