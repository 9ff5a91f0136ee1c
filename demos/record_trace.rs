use log::info;
use pcie_perf_utils::source::{PortRecord, TraceFrame};
use pcie_perf_utils::{
    sysfs_device_dir, ChipFamily, PciCounterSource, PciHandle, PortSample, Sampler,
};
use std::time::Duration;

/// Parse a `dddd:bb:dd.f` PCI address.
fn parse_bdf(s: &str) -> Option<(u32, u32, u32, u32)> {
    let mut it = s.split(|c| c == ':' || c == '.');
    let domain = u32::from_str_radix(it.next()?, 16).ok()?;
    let bus = u32::from_str_radix(it.next()?, 16).ok()?;
    let device = u32::from_str_radix(it.next()?, 16).ok()?;
    let function = u32::from_str_radix(it.next()?, 16).ok()?;
    Some((domain, bus, device, function))
}

fn family_from_str(s: &str) -> ChipFamily {
    match s {
        "deneb" => ChipFamily::Deneb,
        "sirius" => ChipFamily::Sirius,
        "cygnus" => ChipFamily::Cygnus,
        "mira" => ChipFamily::Mira,
        "draco1" => ChipFamily::Draco1,
        "draco2" => ChipFamily::Draco2,
        "capella1" => ChipFamily::Capella1,
        "capella2" => ChipFamily::Capella2,
        "atlas" => ChipFamily::Atlas,
        _ => ChipFamily::Unknown,
    }
}

fn to_frame(elapsed_ms: u64, samples: &[PortSample]) -> TraceFrame {
    TraceFrame {
        elapsed_ms,
        ports: samples
            .iter()
            .map(|s| PortRecord {
                link: s.link,
                ingress: s.ingress,
                egress: s.egress,
            })
            .collect(),
    }
}

/// Usage: record_trace <family> <upstream bdf> <port>=<port bdf>... > trace.json
fn main() -> pcie_perf_utils::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("usage: record_trace <family> <upstream bdf> <port>=<port bdf>...");
        std::process::exit(1);
    }
    let family = family_from_str(&args[0]);
    let bdf = parse_bdf(&args[1])
        .ok_or_else(|| pcie_perf_utils::Error::ParseLink(args[1].clone()))?;
    let interval_ms: u64 = std::env::var("PCIE_PERF_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);
    let frames: usize = std::env::var("PCIE_PERF_FRAMES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let handle = PciHandle::from_sysfs_resource(bdf.0, bdf.1, bdf.2, bdf.3, 0)?;
    let mut source = PciCounterSource::new(handle, family)?;
    let mut builder = Sampler::build().interval(Duration::from_millis(interval_ms));
    for spec in &args[2..] {
        let mut split = spec.splitn(2, '=');
        let port: u8 = split.next().unwrap_or("").parse()?;
        let dev = split
            .next()
            .and_then(parse_bdf)
            .ok_or_else(|| pcie_perf_utils::Error::ParseLink(spec.clone()))?;
        source.add_port(port, sysfs_device_dir(dev.0, dev.1, dev.2, dev.3));
        builder = builder.port(port);
    }
    let mut sampler = builder.open(source)?;

    let mut trace = Vec::with_capacity(frames + 1);
    // Replay reads the first frame as its baseline
    let baseline = sampler.sample_now(0)?;
    trace.push(to_frame(0, &baseline));
    for n in 0..frames {
        let samples = sampler.sample()?;
        let elapsed_ms = samples
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .map(|s| s.elapsed_ms)
            .next()
            .unwrap_or(interval_ms);
        info!("Recorded frame {}", n);
        trace.push(to_frame(elapsed_ms, &samples));
    }
    println!("{}", serde_json::to_string_pretty(&trace)?);
    Ok(())
}
