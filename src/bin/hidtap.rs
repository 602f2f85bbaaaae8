//! hidtap: list HID devices and tap input reports from one of them.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hidtap::{
    allocate_report_buffer, find_device, subscribe, Config, HidHost, Manager, SimDevice,
    SimulatedHost,
};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "hidtap")]
#[command(about = "Enumerate HID devices and print input reports from a target controller")]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target vendor id (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_id)]
    vendor: Option<u16>,

    /// Target product id (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_id)]
    product: Option<u16>,

    /// How long to print reports for
    #[arg(long, default_value_t = 5)]
    listen_secs: u64,

    /// Print the device list as JSON
    #[arg(long)]
    json: bool,

    /// Use a simulated host with a Dualshock4 producing reports
    #[arg(long)]
    simulate: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_id(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id {s:?}: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(vendor) = cli.vendor {
        config.target.vendor_id = vendor;
    }
    if let Some(product) = cli.product {
        config.target.product_id = product;
    }

    if cli.simulate {
        let host = simulated_host();
        run(&host, Some(&host), &cli, &config)
    } else {
        run(native_host()?, None, &cli, &config)
    }
}

#[cfg(feature = "hid")]
fn native_host() -> Result<&'static dyn HidHost> {
    Ok(&hidtap::HidApiHost)
}

#[cfg(not(feature = "hid"))]
fn native_host() -> Result<&'static dyn HidHost> {
    bail!("built without the `hid` feature; use --simulate")
}

fn simulated_host() -> SimulatedHost {
    let host = SimulatedHost::new();
    host.attach(
        SimDevice::new(0x05AC, 0x0250)
            .manufacturer("Apple Inc.")
            .product("Aluminium Keyboard")
            .usage(0x01, 0x06),
    );
    host.attach(SimDevice::dualshock4());
    host.attach(
        SimDevice::new(0x046D, 0xC077)
            .manufacturer("Logitech")
            .product("USB Optical Mouse")
            .usage(0x01, 0x02),
    );
    host
}

fn run(host: &dyn HidHost, sim: Option<&SimulatedHost>, cli: &Cli, config: &Config) -> Result<()> {
    let (vendor, product) = (config.target.vendor_id, config.target.product_id);

    let manager = Manager::open(host, &config.manager_options()).context("opening HID manager")?;
    manager.set_matching(config.matching())?;
    let devices = manager.enumerate()?;

    let metadata = devices.metadata();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    } else {
        println!("{} device(s)", metadata.len());
        for meta in &metadata {
            println!("  {meta}");
        }
    }

    let Some(target) = find_device(&devices, vendor, product) else {
        info!("No device with vendor 0x{vendor:04X} product 0x{product:04X} attached");
        devices.release();
        manager.close();
        return Ok(());
    };
    info!(
        "Found {} at index {}",
        target.product().as_deref().unwrap_or("device"),
        target.index()
    );

    let buffer = allocate_report_buffer(config.reports.buffer_size)?;
    let Some(subscription) = subscribe(Some(target), &buffer, &config.report_settings())? else {
        bail!("report registration was not armed");
    };

    let listen = Duration::from_secs(cli.listen_secs);
    let feeder = match sim {
        Some(sim) => Some(spawn_feeder(sim, target.id(), listen)?),
        None => None,
    };

    let deadline = Instant::now() + listen;
    let mut received = 0u64;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        if let Some(report) = subscription.recv_timeout(remaining.min(Duration::from_millis(100))) {
            received += 1;
            println!(
                "#{:<6} {:>3} bytes  {}",
                report.sequence,
                report.data.len(),
                hex_preview(&report.data, 16)
            );
        }
    }

    let dropped = subscription.dropped();
    subscription.unregister();
    if dropped > 0 {
        warn!(dropped, "reports dropped while printing");
    }
    info!(received, last_sequence = buffer.sequence(), "Listening finished");

    if let Some(feeder) = feeder {
        if feeder.join().is_err() {
            warn!("report feeder panicked");
        }
    }

    devices.release();
    manager.close();
    Ok(())
}

/// Push Dualshock4-shaped reports (id 0x01, sticks centered, counter in byte 7) at 250 Hz.
fn spawn_feeder(
    sim: &SimulatedHost,
    device: hidtap::DeviceRef,
    duration: Duration,
) -> Result<thread::JoinHandle<()>> {
    let injector = sim
        .injector(device)
        .context("simulated target has no report queue")?;
    let handle = thread::Builder::new()
        .name("hidtap-feeder".into())
        .spawn(move || {
            let deadline = Instant::now() + duration;
            let mut counter: u8 = 0;
            while Instant::now() < deadline {
                let mut report = [0u8; 64];
                report[0] = 0x01;
                report[1..5].copy_from_slice(&[0x80, 0x80, 0x80, 0x80]);
                report[5] = 0x08;
                report[7] = counter << 2;
                if !injector.send(&report) {
                    debug!("simulated device gone, feeder stopping");
                    break;
                }
                counter = counter.wrapping_add(1);
                thread::sleep(Duration::from_millis(4));
            }
        })?;
    Ok(handle)
}

fn hex_preview(data: &[u8], max: usize) -> String {
    let mut out: Vec<String> = data.iter().take(max).map(|b| format!("{b:02X}")).collect();
    if data.len() > max {
        out.push("..".into());
    }
    out.join(" ")
}
