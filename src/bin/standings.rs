use anyhow::{Context, Result};
use clap::Parser;
use heat_timer::persist::{read_heat_log, rebuild_ledger, write_standings_file};
use heat_timer::standings::{rank, render_table};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Rebuild tournament standings from a heat log")]
struct Args {
    /// Heat log to read (heats_*.csv)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Write the rebuilt standings snapshot here
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let heats = read_heat_log(&args.input).with_context(|| format!("read {:?}", args.input))?;
    let ledger = rebuild_ledger(&heats);
    let rows = rank(&ledger);
    print!("{}", render_table(&rows));
    eprintln!("{} heats, {} competitors", heats.len(), ledger.len());
    if let Some(out) = &args.out {
        write_standings_file(out, &rows)?;
        eprintln!("standings written to {out:?}");
    }
    Ok(())
}
