//! Periodic sampling of port counters into link statistics.

use crate::counters::{CounterPair, CounterSnapshot};
use crate::link::PortLinkConfig;
use crate::source::CounterSource;
use crate::stats::{compute_statistics, DerivedStatistics};
use crate::Result;
use log::{info, warn};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Outcome of one sampling interval for one port.
#[derive(Debug)]
pub struct PortSample {
    /// Port number.
    pub port: u8,
    /// Link configuration read at the end of the interval.
    pub link: PortLinkConfig,
    /// Ingress counters at the end of the interval.
    pub ingress: CounterSnapshot,
    /// Egress counters at the end of the interval.
    pub egress: CounterSnapshot,
    /// Statistics, or the reason the interval could not be evaluated.
    pub result: Result<DerivedStatistics>,
}

/// Snapshots retained between intervals.
#[derive(Debug, Default, Clone, Copy)]
struct PortHistory {
    previous: (CounterSnapshot, CounterSnapshot),
    before_previous: (CounterSnapshot, CounterSnapshot),
}

/// Helper struct to build a `Sampler`.
#[derive(Debug, Clone)]
pub struct SamplerBuilder {
    /// Time slept between snapshots.
    ///
    /// Defaults to 1 second.
    interval: Duration,
    /// Ports to monitor.
    ///
    /// Defaults to none.
    ports: Vec<u8>,
    /// Replace dropped out counters.
    ///
    /// Defaults to the chip family's known behaviour.
    repair_dropouts: Option<bool>,
    /// Leave the hardware counters running instead of resetting them on open.
    ///
    /// Defaults to `false`.
    keep_counters: bool,
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        SamplerBuilder {
            interval: Duration::from_millis(1000),
            ports: vec![],
            repair_dropouts: None,
            keep_counters: false,
        }
    }
}

macro_rules! builder_pattern {
    ($(#[$outer:meta])* $var_name: ident : $var_type: ty) => {
        builder_pattern!($(#[$outer])* $var_name => $var_name: $var_type);
    };
    ($(#[$outer:meta])* $name: ident => $var_name: ident : $var_type: ty) => {
        $(#[$outer])*
        pub fn $name(mut self, $var_name: $var_type) -> Self {
            self.$var_name = $var_name;
            self
        }
    };
}

macro_rules! builder_pattern_bool {
    ($(#[$outer:meta])* $var_name: ident) => {
        builder_pattern_bool!($(#[$outer])* $var_name => $var_name);
    };
    ($(#[$outer:meta])* $name: ident => $var_name: ident) => {
        $(#[$outer])*
        pub fn $name(mut self) -> Self {
            self.$var_name = true;
            self
        }
    };
}

impl SamplerBuilder {
    builder_pattern!(
        /// Set the time slept between snapshots.
        interval: Duration
    );

    /// Add `port` to the monitored ports.
    pub fn port(mut self, port: u8) -> Self {
        if !self.ports.contains(&port) {
            self.ports.push(port);
        }
        self
    }

    /// Force dropout repair on or off regardless of chip family.
    pub fn repair_dropouts(mut self, enable: bool) -> Self {
        self.repair_dropouts = Some(enable);
        self
    }

    builder_pattern_bool!(
        /// Do not reset the hardware counters when opening.
        keep_counters
    );

    /// Generate the `Sampler`, taking the initial snapshot of every port from `source`.
    pub fn open<S: CounterSource>(self, mut source: S) -> Result<Sampler<S>> {
        if !self.keep_counters {
            source.reset_counters()?;
        }
        let mut history = HashMap::with_capacity(self.ports.len());
        for &port in self.ports.iter() {
            let snapshot = source.fetch_counters(port)?;
            history.insert(
                port,
                PortHistory {
                    previous: snapshot,
                    before_previous: snapshot,
                },
            );
        }
        info!(
            "Sampling ports {:?} every {} ms",
            self.ports,
            self.interval.as_millis()
        );
        Ok(Sampler {
            source,
            interval: self.interval,
            ports: self.ports,
            repair_dropouts: self.repair_dropouts,
            history,
            last: Instant::now(),
        })
    }
}

/// Turns successive counter snapshots of a set of ports into statistics.
#[derive(Debug)]
pub struct Sampler<S> {
    source: S,
    interval: Duration,
    ports: Vec<u8>,
    repair_dropouts: Option<bool>,
    history: HashMap<u8, PortHistory>,
    /// Time of the last snapshot.
    last: Instant,
}

impl Sampler<()> {
    /// Construct a new sampler using the associated builder.
    pub fn build() -> SamplerBuilder {
        SamplerBuilder::default()
    }
}

impl<S: CounterSource> Sampler<S> {
    /// Monitored ports.
    #[inline]
    pub fn ports(&self) -> &[u8] {
        &self.ports
    }

    /// Underlying counter source.
    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Sleep one interval, then snapshot every port and derive its statistics.
    pub fn sample(&mut self) -> Result<Vec<PortSample>> {
        std::thread::sleep(self.interval);
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last).as_millis() as u64;
        let samples = self.sample_now(elapsed_ms)?;
        self.last = now;
        Ok(samples)
    }

    /// Snapshot every port immediately, treating `elapsed_ms` as the length of the interval.
    ///
    /// Source failures abort the whole cycle and leave every port's previous snapshot in place, so
    /// the next successful cycle spans the failed one. Counter data that cannot produce statistics
    /// only fails the affected port's `result`.
    pub fn sample_now(&mut self, elapsed_ms: u64) -> Result<Vec<PortSample>> {
        let mut fetched = Vec::with_capacity(self.ports.len());
        for &port in self.ports.iter() {
            let link = self.source.fetch_link_config(port)?;
            let (ingress, egress) = self.source.fetch_counters(port)?;
            fetched.push((port, link, ingress, egress));
        }

        let mut out = Vec::with_capacity(fetched.len());
        for (port, link, mut ingress, mut egress) in fetched {
            let hist = self.history.entry(port).or_default();

            let repair = self
                .repair_dropouts
                .unwrap_or_else(|| link.family.has_counter_dropouts());
            if repair && link.width != 0 {
                ingress.repair_dropouts(&hist.previous.0, &hist.before_previous.0);
                egress.repair_dropouts(&hist.previous.1, &hist.before_previous.1);
            }

            let result = compute_statistics(
                &link,
                &CounterPair::new(ingress, hist.previous.0),
                &CounterPair::new(egress, hist.previous.1),
                elapsed_ms,
            );
            if let Err(ref e) = result {
                warn!("Skipping interval of port {} - {}", port, e);
            }

            hist.before_previous = hist.previous;
            hist.previous = (ingress, egress);
            out.push(PortSample {
                port,
                link,
                ingress,
                egress,
                result,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{ChipFamily, LinkSpeed};
    use crate::Error;

    /// Source producing a fixed increment per fetch.
    #[derive(Debug, Default)]
    struct RampSource {
        width: u32,
        family: Option<ChipFamily>,
        fetches: u32,
        resets: u32,
        /// Fetch numbers at which posted_dw reads back as zero.
        dropouts: Vec<u32>,
        /// Fetch number at which the source fails.
        fail_at: Option<u32>,
    }

    impl CounterSource for RampSource {
        fn fetch_link_config(&mut self, port: u8) -> Result<PortLinkConfig> {
            let family = self.family.unwrap_or(ChipFamily::Cygnus);
            Ok(PortLinkConfig::new(family, port, self.width, LinkSpeed::Gen2))
        }

        fn fetch_counters(&mut self, port: u8) -> Result<(CounterSnapshot, CounterSnapshot)> {
            self.fetches += 1;
            if self.fail_at == Some(self.fetches) {
                return Err(Error::UnknownPort(port));
            }
            let mut s = CounterSnapshot {
                posted_header: self.fetches * 10,
                posted_dw: self.fetches * 100,
                ..Default::default()
            };
            if self.dropouts.contains(&self.fetches) {
                s.posted_dw = 0;
            }
            Ok((s, CounterSnapshot::default()))
        }

        fn reset_counters(&mut self) -> Result<()> {
            self.resets += 1;
            Ok(())
        }
    }

    #[test]
    fn test_sample_now() {
        let src = RampSource {
            width: 2,
            ..Default::default()
        };
        let mut sampler = Sampler::build().port(3).port(3).open(src).unwrap();
        assert_eq!(sampler.ports(), &[3]);
        assert_eq!(sampler.source().resets, 1);

        let samples = sampler.sample_now(500).unwrap();
        assert_eq!(samples.len(), 1);
        let stats = samples[0].result.as_ref().unwrap();
        assert_eq!(stats.ingress.total_bytes, 400);
        assert_eq!(stats.ingress.total_byte_rate, 800.0);
        assert_eq!(stats.ingress.payload_write_bytes, 200);
        assert_eq!(samples[0].ingress.posted_dw, 200);
    }

    #[test]
    fn test_link_down_does_not_abort() {
        let src = RampSource {
            width: 0,
            ..Default::default()
        };
        let mut sampler = Sampler::build().port(0).port(1).keep_counters().open(src).unwrap();
        assert_eq!(sampler.source().resets, 0);
        let samples = sampler.sample_now(1000).unwrap();
        assert_eq!(samples.len(), 2);
        for s in samples {
            assert!(match s.result {
                Err(Error::LinkDown) => true,
                _ => false,
            });
        }
    }

    #[test]
    fn test_sample_sleeps() {
        let src = RampSource {
            width: 1,
            ..Default::default()
        };
        let mut sampler = Sampler::build()
            .interval(Duration::from_millis(20))
            .port(0)
            .open(src)
            .unwrap();
        let samples = sampler.sample().unwrap();
        let stats = samples[0].result.as_ref().unwrap();
        assert!(stats.elapsed_ms >= 20);
    }

    #[test]
    fn test_source_failure_keeps_history() {
        let src = RampSource {
            width: 4,
            fail_at: Some(4),
            ..Default::default()
        };
        // Baselines from fetches 1 and 2
        let mut sampler = Sampler::build().port(0).port(1).open(src).unwrap();
        // Port 0 reads fetch 3, port 1 fails on fetch 4
        assert!(sampler.sample_now(1000).is_err());

        // Port 0 is still measured against fetch 1
        let samples = sampler.sample_now(2000).unwrap();
        let stats = samples[0].result.as_ref().unwrap();
        assert_eq!(samples[0].ingress.posted_dw, 500);
        assert_eq!(stats.ingress.total_bytes, 1600);
        assert_eq!(stats.ingress.total_byte_rate, 800.0);
    }

    #[test]
    fn test_draco_dropout_repair() {
        let src = RampSource {
            width: 4,
            family: Some(ChipFamily::Draco1),
            dropouts: vec![3],
            ..Default::default()
        };
        let mut sampler = Sampler::build().port(0).open(src).unwrap();
        sampler.sample_now(1000).unwrap();
        let samples = sampler.sample_now(1000).unwrap();
        // posted_dw dropped to 0 at fetch 3, extrapolated back to 300
        assert_eq!(samples[0].ingress.posted_dw, 300);
        assert_eq!(samples[0].result.as_ref().unwrap().ingress.total_bytes, 400);
    }

    #[test]
    fn test_dropout_repair_disabled() {
        let src = RampSource {
            width: 4,
            family: Some(ChipFamily::Draco1),
            dropouts: vec![3],
            ..Default::default()
        };
        let mut sampler = Sampler::build()
            .port(0)
            .repair_dropouts(false)
            .open(src)
            .unwrap();
        sampler.sample_now(1000).unwrap();
        let samples = sampler.sample_now(1000).unwrap();
        assert_eq!(samples[0].ingress.posted_dw, 0);
    }
}
