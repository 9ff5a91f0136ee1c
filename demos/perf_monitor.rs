use log::{error, info};
use pcie_perf_utils::{
    format_bytes, Direction, DirectionStatistics, PortSample, ReplaySource, Sampler,
};

fn print_direction(port: u8, tag: &str, d: &DirectionStatistics) {
    println!(
        " {:>2} {}: {:6.2}% {:>10} {:>10}/s {:>10} {:>10}/s {:7.2} B",
        port,
        tag,
        d.link_utilization,
        format_bytes(d.total_bytes),
        format_bytes(d.total_byte_rate as u64),
        format_bytes(d.payload_total_bytes),
        format_bytes(d.payload_byte_rate as u64),
        d.payload_avg_per_tlp,
    );
}

fn print_samples(samples: &[PortSample]) {
    for s in samples {
        match s.result {
            Ok(ref stats) => {
                for &(dir, tag) in &[(Direction::Ingress, "Ing"), (Direction::Egress, "Egr")] {
                    print_direction(s.port, tag, stats.direction(dir));
                }
            }
            Err(ref e) => error!("Port {}: {}", s.port, e),
        }
    }
    println!();
}

fn main() -> pcie_perf_utils::Result<()> {
    env_logger::init();

    // Get path to a recorded trace
    let prg_args = std::env::args().nth(1);
    let trace_path = if let Some(a) = prg_args {
        a
    } else {
        std::env::var("PCIE_PERF_TRACE")?
    };

    let source = ReplaySource::from_file(&trace_path)?;
    let mut ports: Vec<u8> = source
        .frames()
        .first()
        .map(|f| f.ports.iter().map(|r| r.link.port).collect())
        .unwrap_or_default();
    ports.sort();
    info!("Replaying {} frames for ports {:?}", source.frames().len(), ports);

    let mut builder = Sampler::build().keep_counters();
    for p in ports.iter() {
        builder = builder.port(*p);
    }
    let mut sampler = builder.open(source)?;

    println!("         Link      Total      Total        Pyld        Pyld       Pyld");
    println!("  Port   Util       Data       Rate        Total       Rate      Avg/TLP");
    println!(" --------------------------------------------------------------------------");
    while let Some(elapsed_ms) = ports
        .first()
        .and_then(|p| sampler.source().pending_elapsed_ms(*p))
    {
        let samples = sampler.sample_now(elapsed_ms)?;
        print_samples(&samples);
    }

    Ok(())
}
