//! sriovstatd - SR-IOV virtual function metrics exporter.
//!
//! Discovers SR-IOV network PFs from sysfs at startup and serves per-VF
//! counters at `GET /metrics` in the Prometheus text format.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod limiter;
mod web;

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use prometheus::Registry;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_os = "linux"))]
use sriovstat_core::collector::MockLinks;
#[cfg(target_os = "linux")]
use sriovstat_core::collector::RtnetlinkQuery;
use sriovstat_core::collector::sriov::SupportedDrivers;
use sriovstat_core::collector::{
    CollectorConfig, DEFAULT_NET_ROOT, DEFAULT_PCI_ROOT, RealFs, SriovCollector,
};
use sriovstat_core::exposition::SriovMetrics;

use limiter::RateLimiter;

/// SR-IOV virtual function metrics exporter.
#[derive(Parser, Debug)]
#[command(
    name = "sriovstatd",
    about = "SR-IOV virtual function metrics exporter",
    version = sriovstat_core::VERSION
)]
struct Args {
    /// Address to listen on. A leading ':' listens on all interfaces.
    #[arg(long = "web.listen-address", default_value = ":9808", env = "SRIOVSTAT_LISTEN")]
    listen_address: String,

    /// Requests per second allowed on the metrics endpoint.
    #[arg(long = "web.rate-limit", default_value = "1", env = "SRIOVSTAT_RATE_LIMIT")]
    rate_limit: u32,

    /// Maximum request burst on the metrics endpoint.
    #[arg(long = "web.rate-burst", default_value = "10", env = "SRIOVSTAT_RATE_BURST")]
    rate_burst: u32,

    /// PCI device directory.
    #[arg(long = "path.sysbuspci", default_value = DEFAULT_PCI_ROOT, env = "SRIOVSTAT_SYS_BUS_PCI")]
    sys_bus_pci: PathBuf,

    /// Network class directory.
    #[arg(long = "path.sysclassnet", default_value = DEFAULT_NET_ROOT, env = "SRIOVSTAT_SYS_CLASS_NET")]
    sys_class_net: PathBuf,

    /// VF stats backends in the order they are tried (sysfs, netlink).
    #[arg(
        long = "collector.vfstatspriority",
        default_value = "sysfs,netlink",
        value_delimiter = ',',
        env = "SRIOVSTAT_VF_STATS_PRIORITY"
    )]
    vf_stats_priority: Vec<String>,

    /// YAML file listing the minimum supported version of each driver.
    /// When unset or unreadable, every driver is supported.
    #[arg(
        long = "path.supported-drivers-version-db",
        value_name = "PATH",
        env = "SRIOVSTAT_SUPPORTED_DRIVERS_DB"
    )]
    supported_drivers_db: Option<PathBuf>,

    /// More log output: -v for debug, -vv for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log errors only.
    #[arg(short, long)]
    quiet: bool,
}

/// Installs the fmt subscriber. `RUST_LOG` still applies to other crates;
/// the exporter's own targets follow -v/-q and default to info.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["sriovstatd", "sriovstat_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Makes a configured root absolute and resolves every symlink in it.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path must not be empty",
        ));
    }
    std::fs::canonicalize(path)
}

/// Accepts Go-style `:port` addresses meaning "all interfaces".
fn listen_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

fn backend_priority(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Loads the driver database. A file that cannot be read or parsed is logged
/// and every driver stays supported.
fn load_supported_drivers(db: &Path) -> SupportedDrivers {
    let loaded = resolve_path(db)
        .map_err(|e| e.to_string())
        .and_then(|path| SupportedDrivers::from_path(&path).map_err(|e| e.to_string()));
    match loaded {
        Ok(drivers) => {
            info!(path = %db.display(), drivers = drivers.len(), "loaded supported drivers");
            drivers
        }
        Err(e) => {
            error!(path = %db.display(), error = %e,
                "failed to load supported drivers, all drivers are supported");
            SupportedDrivers::allow_all()
        }
    }
}

fn build_config(args: &Args) -> Result<CollectorConfig, String> {
    let pci_root = resolve_path(&args.sys_bus_pci).map_err(|e| {
        format!(
            "failed to resolve path.sysbuspci '{}': {}",
            args.sys_bus_pci.display(),
            e
        )
    })?;
    let net_root = resolve_path(&args.sys_class_net).map_err(|e| {
        format!(
            "failed to resolve path.sysclassnet '{}': {}",
            args.sys_class_net.display(),
            e
        )
    })?;

    let supported_drivers = match &args.supported_drivers_db {
        Some(db) => load_supported_drivers(db),
        None => SupportedDrivers::allow_all(),
    };

    Ok(CollectorConfig {
        pci_root,
        net_root,
        priority: backend_priority(&args.vf_stats_priority),
        supported_drivers,
    })
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!(version = sriovstat_core::VERSION, "sriovstatd starting");

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };
    info!(
        pci_root = %config.pci_root.display(),
        net_root = %config.net_root.display(),
        priority = ?config.priority,
        "collector configured"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args, config)) {
        error!(error = %e, "server error");
        process::exit(1);
    }
}

async fn async_main(args: Args, config: CollectorConfig) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    let links = RtnetlinkQuery::new();
    #[cfg(not(target_os = "linux"))]
    let links = MockLinks::new();

    let collector = SriovCollector::new(RealFs::new(), links, config);
    info!(
        pfs = collector.physical_functions().len(),
        "sriov collector ready"
    );

    let registry = Registry::new();
    if let Err(e) = registry.register(Box::new(SriovMetrics::new(collector))) {
        return Err(io::Error::other(format!(
            "collector could not be registered: {}",
            e
        )));
    }

    let limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_burst));
    let app = web::router(registry, limiter).into_make_service_with_connect_info::<SocketAddr>();

    let addr = listen_address(&args.listen_address);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["sriovstatd"]).unwrap();
        assert_eq!(args.listen_address, ":9808");
        assert_eq!(args.rate_limit, 1);
        assert_eq!(args.rate_burst, 10);
        assert_eq!(args.sys_bus_pci, PathBuf::from("/sys/bus/pci/devices"));
        assert_eq!(args.sys_class_net, PathBuf::from("/sys/class/net"));
        assert_eq!(args.vf_stats_priority, vec!["sysfs", "netlink"]);
        assert!(args.supported_drivers_db.is_none());
    }

    #[test]
    fn test_priority_flag() {
        let args = Args::try_parse_from([
            "sriovstatd",
            "--collector.vfstatspriority",
            "netlink, sysfs,,",
        ])
        .unwrap();
        assert_eq!(
            backend_priority(&args.vf_stats_priority),
            vec!["netlink", "sysfs"]
        );
    }

    #[test]
    fn test_listen_address() {
        assert_eq!(listen_address(":9808"), "0.0.0.0:9808");
        assert_eq!(listen_address("127.0.0.1:9100"), "127.0.0.1:9100");
        assert_eq!(listen_address("[::1]:9808"), "[::1]:9808");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_path() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("devices");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let resolved = resolve_path(&link).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::fs::canonicalize(&real).unwrap());

        assert!(resolve_path(Path::new("")).is_err());
        assert!(resolve_path(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_build_config_fails_on_bad_paths() {
        let args = Args::try_parse_from([
            "sriovstatd",
            "--path.sysbuspci",
            "/nonexistent/sriovstat/pci",
        ])
        .unwrap();
        let err = build_config(&args).unwrap_err();
        assert!(err.contains("path.sysbuspci"));
    }

    #[test]
    fn test_build_config_with_driver_db() {
        let dir = tempfile::tempdir().unwrap();
        let pci = dir.path().join("pci");
        let net = dir.path().join("net");
        std::fs::create_dir(&pci).unwrap();
        std::fs::create_dir(&net).unwrap();
        let db = dir.path().join("drivers.yaml");
        std::fs::write(&db, "drivers:\n  - name: ice\n    version: 1.9.11\n").unwrap();

        let args = Args::try_parse_from([
            "sriovstatd",
            "--path.sysbuspci",
            pci.to_str().unwrap(),
            "--path.sysclassnet",
            net.to_str().unwrap(),
            "--path.supported-drivers-version-db",
            db.to_str().unwrap(),
        ])
        .unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.pci_root, std::fs::canonicalize(&pci).unwrap());
        assert_eq!(config.supported_drivers.len(), 1);

        // A broken database does not stop the exporter
        std::fs::write(&db, "drivers: [").unwrap();
        let config = build_config(&args).unwrap();
        assert!(config.supported_drivers.allows_all());

        std::fs::remove_file(&db).unwrap();
        let config = build_config(&args).unwrap();
        assert!(config.supported_drivers.allows_all());
    }
}
