//! Entry point for `handoff-prefetch`.
//!
//! Runs a simulated drive past a row of access points and prints what the
//! scheduler did.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use handoff_prefetch::config::{OutageAction, SchedulerConfig};
use handoff_prefetch::pacing::Randomization;
use handoff_prefetch::predictor::ThresholdPolicy;
use handoff_prefetch::simulator::{LinkConfig, Simulation};

/// Simulate a station prefetching content ahead of AP handoffs.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Predicted coverage window of one AP as GAIN_MS:LOSS_MS (repeatable).
    #[arg(long = "ap", value_name = "GAIN_MS:LOSS_MS")]
    aps: Vec<String>,

    /// Ordinary requests per second.
    #[arg(short, long, default_value_t = 10.0)]
    frequency: f64,

    /// Simulated drive length in seconds.
    #[arg(short, long, default_value_t = 20.0)]
    duration: f64,

    /// Stop requesting at this sequence number.
    #[arg(long)]
    ceiling: Option<u32>,

    /// Association grace period after a coverage gain, in ms.
    #[arg(long, default_value_t = 200)]
    grace_ms: u64,

    /// Link loss probability.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Base round-trip time in ms.
    #[arg(long, default_value_t = 40)]
    rtt_ms: u64,

    /// Uniform RTT jitter in ms.
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// Send-interval randomization.
    #[arg(long, value_enum, default_value_t = Jitter::None)]
    randomize: Jitter,

    /// Send through the relay during outages with this chance (percent).
    #[arg(long)]
    relay: Option<u8>,

    /// Gate bursts on a rising RTT trend.
    #[arg(long)]
    rising_trend: bool,

    /// Playback rate in sequences per second.
    #[arg(long)]
    playback: Option<f64>,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Jitter {
    None,
    Uniform,
    Exponential,
}

fn parse_ap(arg: &str) -> Result<(Duration, Duration)> {
    let (gain, loss) = arg
        .split_once(':')
        .with_context(|| format!("AP window `{arg}` is not GAIN_MS:LOSS_MS"))?;
    let gain: u64 = gain.trim().parse().with_context(|| format!("bad gain in `{arg}`"))?;
    let loss: u64 = loss.trim().parse().with_context(|| format!("bad loss in `{arg}`"))?;
    Ok((Duration::from_millis(gain), Duration::from_millis(loss)))
}

fn build_config(cli: &Cli) -> Result<SchedulerConfig> {
    if !(cli.frequency.is_finite() && cli.frequency > 0.0) {
        bail!("frequency must be positive, got {}", cli.frequency);
    }
    let windows = cli
        .aps
        .iter()
        .map(|s| parse_ap(s))
        .collect::<Result<Vec<_>>>()?;

    let config = SchedulerConfig {
        seq_ceiling: cli.ceiling,
        send_interval: Duration::try_from_secs_f64(1.0 / cli.frequency)
            .context("frequency too low")?,
        randomization: match cli.randomize {
            Jitter::None => Randomization::None,
            Jitter::Uniform => Randomization::uniform_for(cli.frequency),
            Jitter::Exponential => Randomization::exponential_for(cli.frequency),
        },
        grace: Duration::from_millis(cli.grace_ms),
        threshold_policy: if cli.rising_trend {
            ThresholdPolicy::RisingTrend
        } else {
            ThresholdPolicy::Mean
        },
        outage: match cli.relay {
            Some(hit_chance) => OutageAction::Relay { hit_chance },
            None => OutageAction::Suppress,
        },
        playback_rate: cli.playback,
        seed: cli.seed,
        ..SchedulerConfig::default()
    }
    .with_handoffs(windows)?;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let link = LinkConfig {
        loss_rate: cli.loss,
        base_rtt: Duration::from_millis(cli.rtt_ms),
        jitter: Duration::from_millis(cli.jitter_ms),
        seed: cli.seed,
        ..LinkConfig::default()
    };

    log::info!(
        "Simulating {:.1}s at {} req/s over {} AP(s)",
        cli.duration,
        cli.frequency,
        config.timetable.len()
    );
    let end = Duration::try_from_secs_f64(cli.duration).context("invalid duration")?;
    let mut sim = Simulation::new(config, link)?;
    sim.run_until(end);
    println!("{}", sim.finish());
    Ok(())
}
