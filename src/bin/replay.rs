use anyhow::{Context, Result};
use clap::Parser;
use heat_timer::capture::CaptureReader;
use heat_timer::parser::parse_timer_line;
use heat_timer::record::CaptureFrame;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Replay a raw timer capture and show the heats it contains")]
struct Args {
    /// Capture file to read (.bin)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Also print lines without times (timer telemetry)
    #[arg(long, default_value_t = false)]
    all: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let reader = CaptureReader::open(&args.input)?;
    let mut frames = 0usize;
    let mut heats = 0usize;
    for frame in reader {
        let frame = frame.with_context(|| format!("frame {frames}"))?;
        frames += 1;
        match frame {
            CaptureFrame::Header(h) => {
                eprintln!("Header: v{} source={:?} created={}ns", h.version, h.source, h.created_unix_ns);
            }
            CaptureFrame::Line(line) => {
                let result = parse_timer_line(&line.text);
                if result.is_empty() {
                    if args.all {
                        println!("seq={} heat={} telemetry: {}", line.seq, line.heat_number, line.text);
                    }
                    continue;
                }
                heats += 1;
                let lanes: Vec<String> = result
                    .times()
                    .iter()
                    .map(|t| t.map(|t| format!("{t:.4}")).unwrap_or_else(|| "-".to_string()))
                    .collect();
                let winner = result
                    .winner()
                    .map(|w| format!("lane {} ({:.4}s)", w.lane, w.time))
                    .unwrap_or_else(|| "none".to_string());
                println!(
                    "seq={} heat={} lanes=[{}] winner={}",
                    line.seq,
                    line.heat_number,
                    lanes.join(", "),
                    winner
                );
            }
        }
    }
    eprintln!("Read {} frames, {} timed lines.", frames, heats);
    Ok(())
}
