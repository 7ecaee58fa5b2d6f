use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{info, warn};

use adapters::clock::BootClock;
use adapters::ebpf::{AcctProbeDriver, Kallsyms, builds, kernel_release};
use adapters::http::run_api_server;
use adapters::sinks::new_sink;
use application::pipeline::Pipeline;
use application::probe::Probe;
use domain::kernel::selector::select;
use infrastructure::config::AgentConfig;
use infrastructure::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_PROBE_OBJECT_DIR_DEV, REQUIRED_SYSCTLS,
};
use infrastructure::logging::init_logging;

use crate::cli::Cli;
use crate::shutdown::create_shutdown_token;

/// Run the exporter startup sequence and block until shutdown.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Load config ──────────────────────────────────────────────
    let path = Path::new(&cli.config);
    let config = if path.is_file() {
        AgentConfig::load(path)?
    } else if cli.config == DEFAULT_CONFIG_PATH {
        // No config file is fine; everything has defaults.
        AgentConfig::default()
    } else {
        bail!("config file '{}' not found", cli.config);
    };

    // ── 2. Initialize logging ───────────────────────────────────────
    // CLI flags take precedence over the config file.
    let log_level = cli.log_level.unwrap_or(config.log_level);
    let log_format = cli.log_format.unwrap_or(config.log_format);
    init_logging(log_level, log_format)?;

    let _root_span = tracing::span!(
        tracing::Level::INFO,
        "service",
        service.name = "conntracct",
        service.version = env!("CARGO_PKG_VERSION"),
    )
    .entered();

    info!(
        config_path = %cli.config,
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "conntracct starting"
    );

    if config.pprof_enabled {
        warn!(
            endpoint = %config.pprof_endpoint,
            "pprof_enabled is set but this build has no profiling endpoint"
        );
    }

    // ── 3. Host preparation ─────────────────────────────────────────
    // Without these sysctls conntrack carries no counters to export.
    if config.sysctl_manage {
        adapters::sysctl::apply(REQUIRED_SYSCTLS).context("applying conntrack sysctls")?;
    }

    // ── 4. Clock and kernel discovery ───────────────────────────────
    let clock = BootClock::start();

    let release = kernel_release()?;
    let catalog = builds();
    let build = select(&catalog, &release)?.clone();
    info!(
        kernel = %release,
        probe_version = %build.version,
        object = %build.object_file,
        "probe build selected"
    );

    // ── 5. Load and configure the probe ─────────────────────────────
    let kallsyms = Kallsyms::load().context("parsing kernel symbol table")?;

    let object_dirs = [
        PathBuf::from(&config.probe_object_dir),
        PathBuf::from(DEFAULT_PROBE_OBJECT_DIR_DEV),
    ];
    let driver = AcctProbeDriver::prepare(
        build,
        &object_dirs,
        &config.tracefs_path,
        &kallsyms,
        &config.probe.to_probe_config(),
    )?;
    let probe = Arc::new(Probe::new(Box::new(driver)));

    // ── 6. Pipeline and sinks ───────────────────────────────────────
    let pipeline = Arc::new(Pipeline::new(probe)?);
    for sink_config in config.sink_configs()? {
        let name = sink_config.name.clone();
        let sink = new_sink(&sink_config, Arc::clone(&clock))
            .await
            .with_context(|| format!("initializing sink '{name}'"))?;
        pipeline.register_sink(sink);
    }

    // ── 7. Start and serve ──────────────────────────────────────────
    pipeline.start().await?;

    let shutdown = create_shutdown_token();
    if config.api_enabled {
        let api_pipeline = Arc::clone(&pipeline);
        let endpoint = config.api_endpoint.clone();
        let api_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) =
                run_api_server(api_pipeline, &endpoint, api_shutdown.cancelled_owned()).await
            {
                warn!("stats API server failed: {e:#}");
            }
        });
    }

    // ── 8. Wait for signal, then tear down ──────────────────────────
    shutdown.cancelled().await;
    info!("shutdown signal received, stopping pipeline");
    pipeline.stop().await?;
    info!("conntracct stopped");

    Ok(())
}
