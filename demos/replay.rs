//! Replays a simulated network-device family through the engine.
//!
//! Devices come and go, one is renamed and one stays idle, so every emission
//! rule shows up within a few cycles.
//!
//! Run with:
//! ```bash
//! RUST_LOG=variazioni=debug cargo run --example replay --features demo -- --cycles 20
//! ```

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use variazioni::config::EngineConfig;
use variazioni::delta::CounterWidth;
use variazioni::emission::Cycle;
use variazioni::observers::json::JsonObserver;
use variazioni::observers::prometheus::PrometheusBridge;
use variazioni::observers::table::{TableObserver, TableStyle};
use variazioni::schema::{CounterKind, DriftPolicy, FamilySchema};
use variazioni::snapshot::{CounterSnapshot, EntitySample};
use variazioni::stats::FamilyStats;

/// Output format of the emitted samples.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One exposition line per sample
    Text,
    /// JSON report per cycle
    Json,
    /// Prometheus registry after the last cycle
    Prometheus,
}

/// Table style selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum StyleChoice {
    Ascii,
    #[default]
    Rounded,
    Sharp,
    Modern,
    Markdown,
    Blank,
}

impl From<StyleChoice> for TableStyle {
    fn from(choice: StyleChoice) -> Self {
        match choice {
            StyleChoice::Ascii => TableStyle::Ascii,
            StyleChoice::Rounded => TableStyle::Rounded,
            StyleChoice::Sharp => TableStyle::Sharp,
            StyleChoice::Modern => TableStyle::Modern,
            StyleChoice::Markdown => TableStyle::Markdown,
            StyleChoice::Blank => TableStyle::Blank,
        }
    }
}

/// Snapshot-diff engine replay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of cycles to replay
    #[arg(short, long, default_value_t = 16)]
    cycles: u64,

    /// Cycles between two full emissions
    #[arg(short, long, default_value_t = 6)]
    period: u32,

    /// Offset the full cycles of new devices
    #[arg(long)]
    stagger: bool,

    /// Key-space partitions
    #[arg(long, default_value_t = 1)]
    partitions: usize,

    /// Seconds between two snapshots
    #[arg(long, default_value_t = 5.0)]
    interval: f64,

    /// Host name label value
    #[arg(long, default_value = "node1")]
    hostname: String,

    /// Optional JSON engine configuration, overrides the flags above
    #[arg(long)]
    config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Style of the statistics table
    #[arg(short, long, value_enum, default_value = "rounded")]
    style: StyleChoice,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn schema() -> FamilySchema {
    FamilySchema::new("proc_net_dev")
        .with_entity_label("dev")
        .with_counter(
            "proc_net_dev_rx_kbps",
            CounterKind::rate(CounterWidth::W64, 8. / 1000., 1),
        )
        .with_counter(
            "proc_net_dev_rx_pkts_delta",
            CounterKind::delta(CounterWidth::W32),
        )
        .with_counter("proc_net_dev_mtu", CounterKind::Gauge)
        .with_descriptor("proc_net_dev_present", ["driver"])
        .with_interval_metric("proc_net_dev_metrics_delta_sec")
        .with_drift_policy(DriftPolicy::KeepDeltas)
}

/// Per-device traffic generator: (ifindex, name, driver, bytes/cycle, pkts/cycle).
struct Device {
    ifindex: u32,
    name: &'static str,
    driver: &'static str,
    bytes: u64,
    pkts: u64,
    alive: std::ops::Range<u64>,
}

const DEVICES: &[Device] = &[
    Device {
        ifindex: 1,
        name: "lo",
        driver: "loopback",
        bytes: 0,
        pkts: 0,
        alive: 0..u64::MAX,
    },
    Device {
        ifindex: 2,
        name: "eth0",
        driver: "virtio_net",
        bytes: 125_000,
        pkts: 900,
        alive: 0..u64::MAX,
    },
    Device {
        ifindex: 3,
        name: "eth1",
        driver: "virtio_net",
        bytes: 4_000,
        pkts: 30,
        alive: 0..8,
    },
    Device {
        ifindex: 4,
        name: "veth7a1c",
        driver: "veth",
        bytes: 60_000,
        pkts: 2_000_000_000,
        alive: 5..u64::MAX,
    },
];

fn observe(cycle: u64) -> CounterSnapshot<u32> {
    let mut snapshot = CounterSnapshot::new();
    for dev in DEVICES.iter().filter(|d| d.alive.contains(&cycle)) {
        // eth0 is renamed after ten cycles, same ifindex.
        let name = if dev.ifindex == 2 && cycle >= 10 {
            "ens3"
        } else {
            dev.name
        };
        // eth1 goes idle after three cycles.
        let active = cycle.min(if dev.ifindex == 3 { 3 } else { cycle });
        let mtu = if dev.ifindex == 1 { 65536 } else { 1500 };
        snapshot.insert(
            dev.ifindex,
            EntitySample::new([name], [dev.bytes * active, dev.pkts * active, mtu])
                .with_descriptor([dev.driver]),
        );
    }
    snapshot
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("variazioni={0},replay={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default()
            .with_hostname(args.hostname.as_str())
            .with_full_metrics_factor(args.period)
            .with_stagger_full_cycles(args.stagger)
            .with_partitions(args.partitions),
    };
    info!(?config, cycles = args.cycles, "starting replay");

    let engine = config.partitioned_engine(schema())?;
    let mut caches = engine.new_caches();
    let stats = FamilyStats::new(engine.engine().schema().id());
    let json = JsonObserver::new().wrap_in_report(true);
    let mut bridge = PrometheusBridge::new();

    let mut previous: Option<CounterSnapshot<u32>> = None;
    for t in 0..args.cycles {
        let current = observe(t);
        let timestamp_ms = 1_700_000_000_000 + t * (args.interval * 1000.) as u64;
        let mut cycle = Cycle::new(&current, timestamp_ms).with_interval(args.interval);
        if let Some(previous) = &previous {
            cycle = cycle.with_previous(previous);
        }

        let emission = engine.generate(&cycle, &mut caches)?;
        let mut text = String::new();
        let bytes = emission.render_into(&mut text);
        stats.record(emission.stats(), bytes);

        match args.format {
            OutputFormat::Text => {
                println!("# cycle {}", t);
                print!("{}", text);
            }
            OutputFormat::Json => println!("{}", json.to_json(&emission)?),
            OutputFormat::Prometheus => bridge.observe(&emission)?,
        }
        previous = Some(current);
    }

    if let OutputFormat::Prometheus = args.format {
        print!("{}", bridge.render()?);
    }

    let table = TableObserver::new()
        .with_style(args.style.into())
        .with_title("Generator statistics")
        .render_stats(&[stats.snapshot()]);
    eprintln!("{}", table);
    Ok(())
}
