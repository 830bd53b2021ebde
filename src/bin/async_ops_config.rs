//! async-ops-config: 运行时配置校验与预设查看工具
//!
//! Usage:
//!   async-ops-config validate [<file>]     Validate a configuration file
//!   async-ops-config presets [<file>]      Show resolved preset options
//!   async-ops-config defaults              Print the default configuration as YAML

use anyhow::{bail, Context as _};
use async_ops::{OperationPreset, RuntimeConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        std::process::exit(1);
    };

    match command.as_str() {
        "validate" => cmd_validate(args.get(2)),
        "presets" => cmd_presets(args.get(2)),
        "defaults" => cmd_defaults(),
        "version" | "--version" | "-V" => {
            println!("async-ops-config {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"async-ops-config: async-ops 配置工具

USAGE:
    async-ops-config <COMMAND> [FILE]

COMMANDS:
    validate [<file>]     Validate a YAML or JSON configuration file
    presets [<file>]      Show preset options after applying overrides
    defaults              Print the default configuration as YAML
    version               Show version information
    help                  Show this help message

ENVIRONMENT:
    ASYNC_OPS_CONFIG      Configuration file used when FILE is omitted
    RUST_LOG              Log filter (default: warn)"#
    );
}

fn load(path: Option<&String>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(p) => {
            RuntimeConfig::from_file(p).with_context(|| format!("failed to load {}", p))
        }
        None => RuntimeConfig::from_env().context("failed to load configuration from ASYNC_OPS_CONFIG"),
    }
}

fn cmd_validate(path: Option<&String>) -> anyhow::Result<()> {
    if path.is_none() && std::env::var_os(async_ops::config::CONFIG_ENV_VAR).is_none() {
        bail!("no configuration file given and ASYNC_OPS_CONFIG is not set");
    }
    let config = load(path)?;
    println!("✅ configuration is valid");
    println!("  cache.max_size:          {}", config.cache.max_size);
    println!("  network.max_retries:     {}", config.network.max_retries);
    println!("  network.retry_delay_ms:  {}", config.network.retry_delay_ms);
    println!("  network.report_policy:   {:?}", config.network.report_policy);
    println!("  batch.batch_size:        {}", config.batch.batch_size);
    println!("  batch.flush_interval_ms: {}", config.batch.flush_interval_ms);
    println!("  preset overrides:        {}", config.presets.len());
    Ok(())
}

fn cmd_presets(path: Option<&String>) -> anyhow::Result<()> {
    let config = load(path)?;
    println!(
        "{:<12} {:>10} {:>8} {:>10} {:>10} {:>8}",
        "PRESET", "TIMEOUT", "RETRIES", "DELAY", "FACTOR", "GLOBAL"
    );
    for preset in OperationPreset::ALL {
        let opts = config.preset_options(preset);
        let timeout = opts
            .effective_timeout()
            .map(|t| format!("{}ms", t.as_millis()))
            .unwrap_or_else(|| "none".to_string());
        println!(
            "{:<12} {:>10} {:>8} {:>10} {:>10} {:>8}",
            preset.name(),
            timeout,
            opts.retries,
            format!("{}ms", opts.retry_delay.as_millis()),
            opts.backoff_multiplier,
            opts.show_global_loader
        );
    }
    Ok(())
}

fn cmd_defaults() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&RuntimeConfig::default())
        .context("failed to serialize default configuration")?;
    print!("{}", yaml);
    Ok(())
}
