use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use dotenvy::dotenv;
use heat_timer::capture::CaptureSink;
use heat_timer::persist::{now_local, session_stamp, ResultsWriter};
use heat_timer::race::LANES;
use heat_timer::standings::render_table;
use heat_timer::transport::{ByteSource, ReaderSource};
use heat_timer::{HeatReport, LaneAssignment, ListenState, PipelineEvent, Tournament};
use log::{info, warn};
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(version, about = "Four-lane race timer tournament logger")]
struct Args {
    /// Timer device to read from (a configured serial device node)
    #[arg(long, env = "TIMER_DEVICE")]
    device: Option<PathBuf>,

    /// Directory for heat logs and standings snapshots
    #[arg(long, env = "RESULTS_DIR", default_value = "race_results")]
    results_dir: PathBuf,

    /// Also record every received line to this capture file (.bin)
    #[arg(long, env = "CAPTURE_FILE")]
    capture: Option<PathBuf>,

    /// Sleep between empty polls of the timer, in milliseconds
    #[arg(long, env = "POLL_MS", default_value_t = 10)]
    poll_ms: u64,

    /// Longest a single poll waits for data, in milliseconds
    #[arg(long, env = "READ_TIMEOUT_MS", default_value_t = 1000)]
    read_timeout_ms: u64,
}

enum Input {
    Line(String),
    Interrupt,
    Eof,
}

fn spawn_stdin(tx: Sender<Input>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if tx.send(Input::Line(l)).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(Input::Eof);
    });
}

fn open_device(path: &Path, read_timeout: Duration) -> Result<Box<dyn ByteSource>> {
    let file = File::open(path).with_context(|| format!("open timer device {path:?}"))?;
    info!("connected to {path:?}");
    Ok(Box::new(ReaderSource::spawn(file, read_timeout)))
}

const HELP: &str = "\
commands:
  add <name>              register a competitor
  remove <name|#>         withdraw a competitor who has not raced
  list                    list competitors
  lanes <l1> <l2> <l3> <l4>  assign lanes (name, list #, or - for empty)
  auto                    assign the least-raced competitors
  race                    listen for the next heat (cancel or Ctrl+C to stop)
  standings               show standings
  save                    rewrite the standings snapshot now
  connect <device>        (re)connect the timer
  quit                    finish the tournament";

fn resolve_name(t: &Tournament, token: &str) -> Option<String> {
    let ledger = t.ledger().ok()?;
    if let Ok(idx) = token.parse::<usize>() {
        return idx
            .checked_sub(1)
            .and_then(|i| ledger.competitors().get(i))
            .map(|c| c.name().to_string());
    }
    ledger.get(token).map(|c| c.name().to_string())
}

fn print_lanes(lanes: &LaneAssignment) {
    for lane in 1..=LANES {
        println!("  Lane {lane}: {}", lanes.get(lane).unwrap_or("(empty)"));
    }
}

fn print_heat(report: &HeatReport) {
    let o = &report.outcome;
    println!("{}", "=".repeat(60));
    println!("HEAT #{} RESULTS - {}", o.heat_number, o.timestamp);
    println!("{}", "=".repeat(60));
    for (i, lane) in o.lanes.iter().enumerate() {
        let name = lane.name.as_deref().unwrap_or("---");
        match lane.time {
            Some(t) => {
                let mark = match report.winner {
                    Some(w) if w.lane == i + 1 => "  HEAT WINNER!",
                    _ => "",
                };
                println!("  Lane {} - {name:20}: {t:.4}s{mark}", i + 1);
            }
            None => println!("  Lane {} - {name:20}: ---", i + 1),
        }
    }
    if let Some(e) = &report.ledger_error {
        println!("  ! stats not updated: {e}");
    }
    for e in &report.persistence {
        println!("  ! {e}");
    }
    println!();
    print!("{}", render_table(&report.standings));
}

/// Drive one listen to completion, relaying events and turning Ctrl+C or
/// `cancel` into a cancellation request.
fn race(
    t: &mut Tournament,
    lanes: LaneAssignment,
    events: &Receiver<PipelineEvent>,
    inputs: &Receiver<Input>,
) -> Result<bool> {
    if let Err(e) = t.start_listening(lanes) {
        println!("cannot race: {e}");
        return Ok(true);
    }
    println!("Waiting for race data from the timer...");
    let mut keep_going = true;
    loop {
        select! {
            recv(events) -> ev => {
                let ev = ev.context("event channel closed")?;
                match ev {
                    PipelineEvent::Line(line) => println!("raw: {line}"),
                    PipelineEvent::Heat(report) => print_heat(&report),
                    PipelineEvent::State(ListenState::Listening { .. }) => {}
                    PipelineEvent::State(state) => {
                        match state {
                            ListenState::Cancelled => println!("heat cancelled, nothing recorded"),
                            ListenState::Error(e) => println!("timer error: {e}; use `connect` to resume"),
                            _ => {}
                        }
                        t.wait()?;
                        return Ok(keep_going);
                    }
                }
            }
            recv(inputs) -> input => match input {
                Ok(Input::Line(l)) if l.trim() == "cancel" => t.cancel()?,
                Ok(Input::Line(_)) => println!("listening; type `cancel` or press Ctrl+C to stop"),
                Ok(Input::Interrupt) => t.cancel()?,
                Ok(Input::Eof) | Err(_) => {
                    keep_going = false;
                    t.cancel()?;
                }
            },
        }
    }
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let read_timeout = Duration::from_millis(args.read_timeout_ms);

    let stamp = session_stamp(now_local());
    let writer = ResultsWriter::new(&args.results_dir, &stamp);
    println!("Heat results: {:?}", writer.heats_path());
    println!("Standings:    {:?}", writer.standings_path());

    let mut t = Tournament::new(writer).with_idle_backoff(Duration::from_millis(args.poll_ms));
    if let Some(path) = &args.capture {
        let source = args.device.as_ref().map(|d| d.display().to_string()).unwrap_or_default();
        t = t.with_capture(CaptureSink::spawn(path.clone(), &source));
    }
    if let Some(device) = &args.device {
        match open_device(device, read_timeout) {
            Ok(src) => t.connect(src)?,
            Err(e) => warn!("{e:#}"),
        }
    }

    let (input_tx, inputs) = unbounded::<Input>();
    let int_tx = input_tx.clone();
    ctrlc::set_handler(move || {
        let _ = int_tx.send(Input::Interrupt);
    })
    .context("install Ctrl+C handler")?;
    spawn_stdin(input_tx);
    let events = t.events();

    let mut lanes = LaneAssignment::new();
    println!("{HELP}");
    loop {
        let line = match inputs.recv() {
            Ok(Input::Line(l)) => l,
            Ok(Input::Interrupt) | Ok(Input::Eof) | Err(_) => break,
        };
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match cmd {
            "" => {}
            "help" => println!("{HELP}"),
            "add" => match t.register(rest) {
                Ok(c) => println!("registered {}", c.name()),
                Err(e) => println!("{e}"),
            },
            "remove" => {
                let name = resolve_name(&t, rest).unwrap_or_else(|| rest.to_string());
                match t.withdraw(&name) {
                    Ok(()) => {
                        for lane in 1..=LANES {
                            if lanes.get(lane) == Some(name.as_str()) {
                                lanes.clear(lane);
                            }
                        }
                        println!("withdrew {name}");
                    }
                    Err(e) => println!("{e}"),
                }
            }
            "list" => {
                for (i, c) in t.ledger()?.competitors().iter().enumerate() {
                    println!("  {}. {} (raced {} times)", i + 1, c.name(), c.races_count());
                }
            }
            "lanes" => {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                let mut next = LaneAssignment::new();
                let mut ok = true;
                for (i, tok) in tokens.iter().take(LANES).enumerate() {
                    if *tok == "-" {
                        continue;
                    }
                    let res = match resolve_name(&t, tok) {
                        Some(name) => next.assign(i + 1, name),
                        None => {
                            println!("unknown competitor {tok}");
                            ok = false;
                            break;
                        }
                    };
                    if let Err(e) = res {
                        println!("{e}");
                        ok = false;
                        break;
                    }
                }
                if ok {
                    lanes = next;
                    print_lanes(&lanes);
                }
            }
            "auto" => {
                lanes = t.auto_assign()?;
                print_lanes(&lanes);
            }
            "race" => {
                println!("HEAT #{}", t.heat_number()?);
                print_lanes(&lanes);
                if !race(&mut t, lanes.clone(), &events, &inputs)? {
                    break;
                }
            }
            "standings" => print!("{}", render_table(&t.standings()?)),
            "save" => match t.save_standings()? {
                Ok(path) => println!("standings saved to {path:?}"),
                Err(e) => println!("{e}"),
            },
            "connect" => {
                let path = if rest.is_empty() { args.device.clone() } else { Some(PathBuf::from(rest)) };
                match path {
                    // opening the device again would start a second reader on it
                    Some(_) if t.device_busy() => println!("{}", heat_timer::CommandError::DeviceBusy),
                    Some(p) => match open_device(&p, read_timeout) {
                        Ok(src) => {
                            if let Err(e) = t.connect(src) {
                                println!("{e}");
                            }
                        }
                        Err(e) => println!("{e:#}"),
                    },
                    None => println!("usage: connect <device>"),
                }
            }
            "quit" | "exit" => break,
            other => println!("unknown command {other:?}; try `help`"),
        }
    }

    println!("\nTournament complete!");
    print!("{}", render_table(&t.standings()?));
    match t.save_standings()? {
        Ok(path) => println!("Final standings saved to {path:?}"),
        Err(e) => println!("Final standings not saved: {e}"),
    }
    Ok(())
}
