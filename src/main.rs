//! fretscribe: transcribe raw 16-bit mono PCM into a Standard MIDI File.

use anyhow::{bail, Context, Result};
use fretscribe::{SmfWriter, Transcriber, TranscriberConfig};
use std::fs::File;
use std::io::{BufReader, BufWriter};

const USAGE: &str = "\
Usage: fretscribe -f <input.s16> [options]

Options:
  -f <path>                 input, signed 16-bit little-endian mono PCM
  -m <path>                 output Standard MIDI File (default: output.mid)
  --gain <x>                linear input gain (default: 1.0)
  --rate <hz>               sample rate (default: 44100)
  --velocity-gain <x>       velocity per dB (default: 2.0)
  --velocity-offset <x>     velocity at 0 dB (default: 160)
  --threshold <db>          silence threshold (default: -53)
  --verbose                 print a meter row per audible bin and frame
  --no-judge                skip the harmonic tests (diagnostic)
  -h, --help                show this help";

struct Options {
    input: String,
    output: String,
    verbose: bool,
    config: TranscriberConfig,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Options>> {
    let mut input = None;
    let mut output = "output.mid".to_string();
    let mut verbose = false;
    let mut builder = TranscriberConfig::builder();

    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("missing value for `{flag}`"))
        };
        match flag.as_str() {
            "-f" => input = Some(value()?),
            "-m" => output = value()?,
            "--gain" => builder = builder.gain(value()?.parse().context("--gain")?),
            "--rate" => builder = builder.sample_rate(value()?.parse().context("--rate")?),
            "--velocity-gain" => {
                builder = builder.velocity_gain(value()?.parse().context("--velocity-gain")?)
            }
            "--velocity-offset" => {
                builder = builder.velocity_offset(value()?.parse().context("--velocity-offset")?)
            }
            "--threshold" => {
                builder = builder.threshold_db(value()?.parse().context("--threshold")?)
            }
            "--verbose" | "-v" => verbose = true,
            "--no-judge" => builder = builder.disable_judging(true),
            "-h" | "--help" => return Ok(None),
            other => bail!("unknown argument `{other}`\n\n{USAGE}"),
        }
    }

    let Some(input) = input else {
        bail!("no input file given\n\n{USAGE}");
    };
    Ok(Some(Options {
        input,
        output,
        verbose,
        config: builder.build()?,
    }))
}

fn main() -> Result<()> {
    let Some(options) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let default_level = if options.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let input = File::open(&options.input)
        .with_context(|| format!("cannot open input `{}`", options.input))?;
    let output = File::create(&options.output)
        .with_context(|| format!("cannot create output `{}`", options.output))?;

    let mut transcriber = Transcriber::new(options.config)?;
    let mut writer = SmfWriter::new(BufWriter::new(output), transcriber.config());
    let verbose = options.verbose;

    let summary = transcriber.run(BufReader::new(input), &mut writer, |report| {
        if verbose {
            print!("{report}");
        }
        for event in &report.events {
            log::info!("frame {:4}: {:?}", report.index, event.event);
        }
    })?;

    println!(
        "{} frames, {} notes written to {} ({} ticks)",
        summary.frames, summary.note_ons, options.output, summary.total_ticks
    );
    Ok(())
}
