use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use std::sync::Arc;
use subnet_pool::{
    Backoff, BulkLoader, LoaderConfig, PartitionLayout, TableStore, Throughput, TokioSleep,
};

/// Loader used by the lifecycle handler, erased over the backing store.
pub type Loader = BulkLoader<Arc<dyn TableStore>, TokioSleep>;

/// Runtime configuration for the `subnet-pool-server` binary.
///
/// Every setting is parsed from a CLI flag or the matching environment
/// variable. Defaults reproduce the reference allocation: 8192 `/21` blocks
/// of `10.0.0.0/8`, written 25 records at a time.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "subnet-pool-server",
    version,
    about = "Populates subnet allocation tables on stack lifecycle requests"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Allocation tables to provision, empty and at baseline throughput, in
    /// the in-memory store at startup.
    ///
    /// Environment variable: `ALLOCATION_TABLES` (comma separated)
    #[arg(
        long = "table",
        env = "ALLOCATION_TABLES",
        value_delimiter = ',',
        default_value = "cidr-allocations"
    )]
    pub tables: Vec<String>,

    /// First octet shared by every allocated block.
    ///
    /// Environment variable: `BASE_OCTET`
    #[arg(long, env = "BASE_OCTET", default_value_t = 10)]
    pub base_octet: u8,

    /// Number of coarse partitions (second octet values).
    ///
    /// Environment variable: `COARSE_SIZE`
    #[arg(long, env = "COARSE_SIZE", default_value_t = 256)]
    pub coarse_size: u16,

    /// Size of the fine dimension (third octet range).
    ///
    /// Environment variable: `FINE_SIZE`
    #[arg(long, env = "FINE_SIZE", default_value_t = 256)]
    pub fine_size: u16,

    /// Step through the fine dimension. 8 yields `/21` blocks.
    ///
    /// Environment variable: `STRIDE`
    #[arg(long, env = "STRIDE", default_value_t = 8)]
    pub stride: u16,

    /// Records per batched write. Must not exceed the store's per-call limit.
    ///
    /// Environment variable: `BATCH_WRITE_LIMIT`
    #[arg(long, env = "BATCH_WRITE_LIMIT", default_value_t = 25)]
    pub batch_limit: usize,

    /// Re-submissions of unprocessed records per batch.
    ///
    /// Environment variable: `MAX_RETRIES`
    #[arg(long, env = "MAX_RETRIES", default_value_t = 10)]
    pub max_retries: u32,

    /// Backoff unit; retry `k` waits `2^k` of these.
    ///
    /// Environment variable: `BACKOFF_BASE`
    #[arg(long, env = "BACKOFF_BASE", default_value = "10ms", value_parser = humantime::parse_duration)]
    pub backoff_base: Duration,

    /// Read units requested while loading.
    ///
    /// Environment variable: `BOOST_READ_UNITS`
    #[arg(long, env = "BOOST_READ_UNITS", default_value_t = 10)]
    pub boost_read_units: u64,

    /// Write units requested while loading.
    ///
    /// Environment variable: `BOOST_WRITE_UNITS`
    #[arg(long, env = "BOOST_WRITE_UNITS", default_value_t = 2000)]
    pub boost_write_units: u64,

    /// Read units restored after loading.
    ///
    /// Environment variable: `BASELINE_READ_UNITS`
    #[arg(long, env = "BASELINE_READ_UNITS", default_value_t = 10)]
    pub baseline_read_units: u64,

    /// Write units restored after loading.
    ///
    /// Environment variable: `BASELINE_WRITE_UNITS`
    #[arg(long, env = "BASELINE_WRITE_UNITS", default_value_t = 5)]
    pub baseline_write_units: u64,

    /// Time the caller allows per request when it does not send
    /// `X-Remaining-Time-Ms`.
    ///
    /// Environment variable: `INVOCATION_TIMEOUT`
    #[arg(long, env = "INVOCATION_TIMEOUT", default_value = "15m", value_parser = humantime::parse_duration)]
    pub invocation_timeout: Duration,

    /// Reserved at the end of each request for reporting the outcome.
    ///
    /// Environment variable: `SAFETY_MARGIN`
    #[arg(long, env = "SAFETY_MARGIN", default_value = "1s", value_parser = humantime::parse_duration)]
    pub safety_margin: Duration,

    /// Report success when some records are still unprocessed after the last
    /// retry, instead of failing the request.
    ///
    /// Environment variable: `TOLERATE_UNPROCESSED`
    #[arg(long, env = "TOLERATE_UNPROCESSED", default_value_t = false)]
    pub tolerate_unprocessed: bool,

    /// How long shutdown waits for in-flight requests to report.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub tables: Vec<String>,
    pub loader: LoaderConfig,
    pub invocation_timeout: Duration,
    pub safety_margin: Duration,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let layout =
            PartitionLayout::new(args.base_octet, args.coarse_size, args.fine_size, args.stride)
                .context("invalid partition layout")?;

        if args.batch_limit == 0 {
            bail!("BATCH_WRITE_LIMIT must be greater than 0");
        }

        let tables: Vec<String> = args
            .tables
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.is_empty() {
            bail!("ALLOCATION_TABLES must name at least one table");
        }

        if args.safety_margin >= args.invocation_timeout {
            bail!(
                "SAFETY_MARGIN ({:?}) must be shorter than INVOCATION_TIMEOUT ({:?})",
                args.safety_margin,
                args.invocation_timeout
            );
        }

        if args.boost_write_units < args.baseline_write_units {
            bail!(
                "BOOST_WRITE_UNITS ({}) is below BASELINE_WRITE_UNITS ({})",
                args.boost_write_units,
                args.baseline_write_units
            );
        }

        let loader = LoaderConfig {
            layout,
            batch_limit: args.batch_limit,
            backoff: Backoff::new(args.backoff_base, args.max_retries),
            boost: Throughput::new(args.boost_read_units, args.boost_write_units),
            baseline: Throughput::new(args.baseline_read_units, args.baseline_write_units),
            tolerate_unprocessed: args.tolerate_unprocessed,
        };

        Ok(Self {
            server_addr: args.server_addr,
            tables,
            loader,
            invocation_timeout: args.invocation_timeout,
            safety_margin: args.safety_margin,
            shutdown_timeout: args.shutdown_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = std::iter::once("subnet-pool-server").chain(args.iter().copied());
        let cli = CliArgs::try_parse_from(argv)?;
        ServerConfig::try_from(cli)
    }

    #[test]
    fn defaults_match_reference_allocation() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.loader, LoaderConfig::default());
        assert_eq!(config.tables, ["cidr-allocations"]);
        assert_eq!(config.invocation_timeout, Duration::from_secs(900));
        assert_eq!(config.safety_margin, Duration::from_secs(1));
    }

    #[test]
    fn parses_tables_and_durations() {
        let config = parse(&[
            "--table",
            "a, b,,c",
            "--backoff-base",
            "25ms",
            "--safety-margin",
            "2s",
            "--tolerate-unprocessed",
        ])
        .unwrap();
        assert_eq!(config.tables, ["a", "b", "c"]);
        assert_eq!(config.loader.backoff.base(), Duration::from_millis(25));
        assert_eq!(config.safety_margin, Duration::from_secs(2));
        assert!(config.loader.tolerate_unprocessed);
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(parse(&["--stride", "0"]).is_err());
        assert!(parse(&["--batch-limit", "0"]).is_err());
        assert!(parse(&["--safety-margin", "20m"]).is_err());
        assert!(parse(&["--boost-write-units", "1"]).is_err());
    }
}
