//! CLI driver: stream a trace file through the heavy-hitter engine and
//! print the hot allocation paths.

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use hotpath_rs::trace::{TraceEvent, TraceInfo, TraceReader};
use hotpath_rs::{HeavyHitters, SeenSet};

/// End-of-sequence markers are tagged with the top bit; location codes must
/// stay below it.
const END_MARKER_BIT: u64 = 1 << 63;

#[derive(Parser, Debug)]
#[command(name = "hotpath")]
#[command(about = "Report heavy-hitter allocation paths from a trace file")]
struct Args {
    /// Path to the trace file
    trace: PathBuf,

    /// Report sequences above this fraction of total sampled weight
    #[arg(default_value_t = 0.03)]
    frequency: f64,

    /// Lossy-counting error bound (memory grows with its inverse)
    #[arg(default_value_t = 0.01)]
    error: f64,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("hotpath: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    if !(args.frequency >= 0.0 && args.frequency <= 1.0) {
        return Err(format!("frequency {} out of [0, 1]", args.frequency).into());
    }
    if !(args.error > 0.0 && args.error < 1.0) {
        return Err(format!("error {} out of (0, 1)", args.error).into());
    }

    let mut engine: HeavyHitters<u64> = HeavyHitters::new(args.error);
    let mut seen: SeenSet<u64> = SeenSet::new();
    // dedup_len[d] = length of the deduplicated backtrace after d raw frames.
    let mut dedup_len: Vec<usize> = vec![0];
    let mut info: Option<TraceInfo> = None;
    let mut next_marker: u64 = 0;

    for event in TraceReader::open(&args.trace)? {
        match event? {
            TraceEvent::Info(i) => info = Some(i),
            TraceEvent::Alloc(alloc) => {
                if alloc.common_prefix >= dedup_len.len() {
                    return Err(format!(
                        "common prefix {} exceeds previous backtrace length {}",
                        alloc.common_prefix,
                        dedup_len.len() - 1
                    )
                    .into());
                }
                seen.pop_until(alloc.common_prefix);
                dedup_len.truncate(alloc.common_prefix + 1);
                let base = dedup_len[alloc.common_prefix];

                let mut extension: Vec<u64> = Vec::with_capacity(alloc.extension.len() + 1);
                for (i, &loc) in alloc.extension.iter().enumerate() {
                    if loc & END_MARKER_BIT != 0 {
                        return Err(format!("location code {loc:#x} out of range").into());
                    }
                    // Strip frames already on the live backtrace (recursion).
                    if !seen.mem(loc) {
                        seen.add(loc, alloc.common_prefix + i);
                        extension.push(loc);
                    }
                    dedup_len.push(base + extension.len());
                }
                extension.push(END_MARKER_BIT | next_marker);
                next_marker += 1;

                engine.insert(base, &extension, alloc.nsamples);
            }
        }
    }

    print_report(&mut engine, args.frequency, info.as_ref());
    Ok(())
}

fn print_report(engine: &mut HeavyHitters<u64>, frequency: f64, info: Option<&TraceInfo>) {
    let report = engine.output(frequency);
    let (rate, word_size) = info.map_or((1.0, 8), |i| (i.sample_rate, i.word_size));
    let to_bytes = |words: u64| (words as f64 / rate * word_size as f64).round() as u64;

    if let Some(i) = info {
        println!(
            "{} (pid {}): {} sampled words at rate {}",
            i.executable,
            i.pid,
            report.grand_total,
            rate
        );
    } else {
        println!("{} sampled words", report.grand_total);
    }

    for hitter in &report.hitters {
        let locs: Vec<String> = hitter
            .label
            .iter()
            .filter(|&&s| s & END_MARKER_BIT == 0)
            .map(|s| format!("{s:#x}"))
            .collect();
        if locs.is_empty() {
            continue;
        }
        println!(
            "{:>14} bytes ({} .. {})  {}",
            to_bytes(hitter.total),
            to_bytes(hitter.light),
            to_bytes(hitter.upper),
            locs.join(" ")
        );
    }
}
