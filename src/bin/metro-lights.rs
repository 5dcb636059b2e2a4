#![allow(clippy::print_stdout)]

use std::collections::BTreeMap;
use std::io::{self, BufRead as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use metro_light_composer::mapping::{show_test_pattern, test_pattern};
use metro_light_composer::sink::blank;
use metro_light_composer::{
    Config, Controller, Instant, MapCommand, PositionMap, SimulatedSink, SnapshotFetcher, StationMapper,
    WmataClient,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "metro-lights", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the updater against a simulated strip.
    Run {
        /// Config JSON; the built-in Red Line layout when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many seconds instead of running until killed.
        #[arg(long)]
        for_secs: Option<u64>,
    },
    /// Fetch one snapshot and print the boarding stops as JSON.
    Fetch {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a config and print a summary.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Interactively assign each station to an LED and save the result.
    Map {
        /// Config supplying the station list and line colors.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Where to write the mapped config JSON.
        #[arg(long)]
        out: PathBuf,

        /// Strip length; defaults to the config's strip length.
        #[arg(long)]
        led_count: Option<usize>,

        /// How long to show the test pattern after saving.
        #[arg(long, default_value_t = 10)]
        pattern_secs: u64,
    },
    /// Light every mapped position in a distinct color.
    TestPattern {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 10)]
        secs: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run { config, for_secs } => cmd_run(config.as_deref(), for_secs),
        Command::Fetch { config } => cmd_fetch(config.as_deref()),
        Command::CheckConfig { config } => cmd_check_config(config.as_deref()),
        Command::Map {
            config,
            out,
            led_count,
            pattern_secs,
        } => cmd_map(config.as_deref(), &out, led_count, pattern_secs),
        Command::TestPattern { config, secs } => cmd_test_pattern(config.as_deref(), secs),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("load config '{}'", path.display())),
        None => Ok(Config::default()),
    }
}

fn cmd_run(config: Option<&Path>, for_secs: Option<u64>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let client = WmataClient::new(&config.api).context("create WMATA client")?;
    let count = config.position_map()?.count();

    let controller = Controller::from_config(&config, Arc::new(client), SimulatedSink::new(count))?;
    let status = controller.start()?;
    tracing::info!(?status, leds = count, "running");

    match for_secs {
        Some(secs) => thread::sleep(Duration::from_secs(secs)),
        None => loop {
            thread::park();
        },
    }

    controller.stop();
    let lit = controller.with_sink(SimulatedSink::lit);
    println!("{}", serde_json::to_string_pretty(&controller.status())?);
    tracing::info!(lit, "stopped");
    Ok(())
}

fn cmd_fetch(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let client = WmataClient::new(&config.api).context("create WMATA client")?;

    let now = Instant::now();
    let mut fetcher = SnapshotFetcher::new(
        Arc::new(client),
        Arc::new(config.palette()),
        config.fetch_policy(),
        now,
    );
    let snapshot = fetcher.fetch(now).context("fetch predictions")?;
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

fn cmd_check_config(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let positions = config.position_map()?;
    let palette = config.palette();

    let summary = serde_json::json!({
        "stations": positions.len(),
        "led_count": positions.count(),
        "lines": palette.lines(),
        "fetch_ttl_secs": config.timings.fetch_ttl_secs,
        "tick_millis": config.timings.tick_millis,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_map(config: Option<&Path>, out: &Path, led_count: Option<usize>, pattern_secs: u64) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let count = match led_count {
        Some(count) => count,
        None => config.position_map()?.count(),
    };

    let mut stations: BTreeMap<String, String> = config.station_names.clone();
    for code in config.stations.keys() {
        stations.entry(code.clone()).or_insert_with(|| code.clone());
    }
    let mut mapper = StationMapper::new(stations.into_iter().collect(), count)?;
    let mut sink = SimulatedSink::new(count);
    let mut input = io::stdin().lock().lines();

    println!("[Enter] accept LED, n next LED, p previous LED, s skip station, q save and quit");
    while let Some((code, name)) = mapper.station() {
        mapper.show(&mut sink)?;
        print!("{name} ({code}) on LED {}: ", mapper.cursor());
        io::stdout().flush()?;

        let Some(line) = input.next() else {
            break;
        };
        match MapCommand::parse(&line.context("read command")?) {
            Some(MapCommand::Accept) => {
                if let Err(err) = mapper.accept() {
                    println!("{err}");
                }
            }
            Some(MapCommand::Next) => {
                mapper.next_led();
            }
            Some(MapCommand::Prev) => {
                mapper.prev_led();
            }
            Some(MapCommand::Skip) => mapper.skip(),
            Some(MapCommand::Quit) => break,
            None => println!("unknown command"),
        }
    }
    blank(&mut sink)?;

    if mapper.assignments().is_empty() {
        println!("no stations mapped, nothing saved");
        return Ok(());
    }
    let mapped = mapper.assignments().len();
    let config = mapper.into_config(config)?;
    std::fs::write(out, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("write config '{}'", out.display()))?;
    println!("saved {mapped} stations to {}", out.display());

    run_test_pattern(&config.position_map()?, &mut sink, pattern_secs)
}

fn cmd_test_pattern(config: Option<&Path>, secs: u64) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let positions = config.position_map()?;
    let mut sink = SimulatedSink::new(positions.count());
    println!(
        "{}",
        serde_json::to_string_pretty(&test_pattern(&positions).to_published())?
    );
    run_test_pattern(&positions, &mut sink, secs)
}

fn run_test_pattern(positions: &PositionMap, sink: &mut SimulatedSink, secs: u64) -> anyhow::Result<()> {
    for _ in 0..secs {
        let report = show_test_pattern(positions, sink);
        if !report.is_clean() {
            tracing::warn!(failed_writes = report.failed_writes, "test pattern degraded");
        }
        thread::sleep(Duration::from_secs(1));
    }
    blank(sink)?;
    Ok(())
}
