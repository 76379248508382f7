//! dnsproxy-rust - resolves one question through a pool of upstreams

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use dnsproxy::config::{parse_duration, UpstreamConfig};
use dnsproxy::dnscrypt::CertificateStore;
use dnsproxy::upstream::DEFAULT_DNS_PORT;
use dnsproxy::{client, metrics, wire, DnsClass, DnsClient, DnsUpstream, Message, RecordType, UpstreamPool};
use rolling_file::{RollingConditionBasic, RollingFileAppender};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CERTIFICATE_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Log timestamps in local time rather than UTC.
struct LocalTimer;
impl fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "dnsproxy-rust")]
#[command(about = "Resolve a name through plain DNS, DNS-over-HTTPS and DNSCrypt upstreams", long_about = None)]
struct Args {
    /// Domain name to resolve
    name: String,

    /// Record type mnemonic or number
    #[arg(short = 't', long = "type", default_value = "A")]
    qtype: String,

    /// Upstream URI or sdns:// stamp, in priority order
    #[arg(short, long = "upstream")]
    upstreams: Vec<String>,

    /// JSON file listing upstreams
    #[arg(long)]
    upstreams_file: Option<PathBuf>,

    /// Per-client timeout (500ms, 5s, 1m)
    #[arg(long, default_value = "5s")]
    timeout: String,

    /// Send plain DNS queries over TCP
    #[arg(long)]
    tcp: bool,

    /// Also write daily-rotated logs into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print Prometheus metrics after resolving
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cores)
        .thread_name("dnsproxy-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_logging(log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stdout).with_timer(LocalTimer))
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory '{}'", dir.display()))?;
    let file_appender = RollingFileAppender::new(
        dir.join("dnsproxy.log"),
        RollingConditionBasic::new().daily(),
        30,
    )?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_timer(LocalTimer))
        .with(fmt::layer().with_writer(std::io::stdout).with_timer(LocalTimer))
        .init();
    Ok(Some(guard))
}

/// Rewrites a UDP upstream to `tcp://`, keeping its code.
fn force_tcp(upstream: DnsUpstream) -> Result<DnsUpstream> {
    if !matches!(upstream.scheme(), None | Some("udp") | Some("dns")) || upstream.is_dnscrypt() {
        return Ok(upstream);
    }
    let uri = format!("tcp://{}", upstream.address().host_port(DEFAULT_DNS_PORT));
    Ok(DnsUpstream::parse(&uri)?.with_code(upstream.code()))
}

async fn async_main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(args.log_dir.as_ref())?;
    info!("Starting dnsproxy-rust version {}", env!("CARGO_PKG_VERSION"));

    let qtype: RecordType = args
        .qtype
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid record type '{}': {}", args.qtype, e))?;
    let timeout = parse_duration(&args.timeout)?;

    let mut config = match &args.upstreams_file {
        Some(path) => UpstreamConfig::load(path)?,
        None => UpstreamConfig::default(),
    };
    config.upstreams.extend(UpstreamConfig::from_uris(args.upstreams.iter().cloned()).upstreams);
    if config.upstreams.is_empty() {
        config = UpstreamConfig::defaults();
    }

    let mut upstreams = config.into_upstreams()?;
    if args.tcp {
        upstreams = upstreams.into_iter().map(force_tcp).collect::<Result<_>>()?;
    }

    let clients: Vec<Arc<dyn DnsClient>> = vec![
        client::create_client(client::ClientKind::Plain)?,
        client::create_client(client::ClientKind::DoH)?,
        Arc::new(client::DnsCryptClient::with_certificate_store(CertificateStore::with_cache(CERTIFICATE_CACHE_TTL))),
    ];
    for upstream in &upstreams {
        info!(upstream = %upstream, uri = %upstream.uri(), "Upstream registered");
    }

    let pool = UpstreamPool::new(upstreams, clients)
        .with_client_timeout(timeout)
        .with_resolve_timeout(timeout * 3);

    let request = Message::query(&args.name, qtype, DnsClass::IN);
    let outcome = pool.resolve(&request).await;
    if args.metrics {
        print!("{}", metrics::render());
    }

    let resource = match outcome {
        Ok(resource) => resource,
        Err(e) => {
            if let dnsproxy::ResolveError::UnableToResolve { failures, .. } = &e {
                for failure in failures {
                    error!("{}", failure);
                }
            }
            return Err(e.into());
        }
    };

    let response = &resource.response;
    println!(
        ";; {} via {} ({}), rcode {}, id {}, {} bytes",
        resource.upstream,
        resource.client.name(),
        resource.upstream.uri(),
        response.rcode().as_str(),
        response.id(),
        wire::encode(response)?.len()
    );
    for record in response.answers() {
        match record.ip_addr() {
            Some(ip) => println!("{}\t{}\t{}\t{}", record.name, record.ttl, record.rtype, ip),
            None => match record.txt_strings() {
                Some(strings) => {
                    let text: Vec<String> = strings.iter().map(|s| format!("{:?}", String::from_utf8_lossy(s))).collect();
                    println!("{}\t{}\t{}\t{}", record.name, record.ttl, record.rtype, text.join(" "));
                }
                None => println!("{}\t{}\t{}\t{}", record.name, record.ttl, record.rtype, hex::encode(&record.data)),
            },
        }
    }
    if let Some(max_age) = resource.cache_max_age() {
        println!(";; max-age {}", max_age);
    }
    Ok(())
}
