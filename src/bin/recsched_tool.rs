//! `recsched-tool`: ambient CLI over already-persisted trace files.
//!
//! Pure post-processing — it never touches a running scheduler, only the
//! `record.txt` / `data_races.txt` files a [`recsched::Scheduler`] wrote out.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "recsched-tool", about = "Inspect recsched trace files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pretty-print the transitions of a persisted `record.txt`.
    Show {
        path: PathBuf,
    },
    /// Count and list the race pairs in a persisted `data_races.txt`.
    Races {
        path: PathBuf,
    },
}

fn main() {
    recsched::logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Show { path } => show(&path),
        Command::Races { path } => races(&path),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn show(path: &std::path::Path) -> std::io::Result<()> {
    let contents = fs::read_to_string(path)?;
    let mut transitions = 0usize;
    let mut status_line = None;
    for line in contents.lines() {
        if line.starts_with('#') {
            transitions += 1;
            println!("{line}");
        } else if let Some(status) = line.strip_prefix("status=") {
            status_line = Some(status.to_string());
        }
    }
    println!("---");
    println!("{transitions} transition(s)");
    if let Some(status) = status_line {
        println!("terminal status: {status}");
    }
    Ok(())
}

fn races(path: &std::path::Path) -> std::io::Result<()> {
    let contents = fs::read_to_string(path)?;
    let pairs: Vec<&str> = contents
        .split(">>>>>")
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    println!("{} race pair(s)", pairs.len());
    for (index, pair) in pairs.iter().enumerate() {
        println!("--- race #{index} ---");
        println!("{pair}");
    }
    Ok(())
}
