//! Locitag — gene → disease criteria builder.
//! Entry point for the `locitag` binary: runs criteria sections against a
//! JSON fixture store and writes criteria documents as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use locitag_common::config::CONFIG_ENV_VAR;
use locitag_common::CriteriaConfig;
use locitag_criteria::{JsonFileLoader, NormalizerRegistry, ScanDriver, ScanProgress, ScanState};
use locitag_store::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "locitag", version, about = "Build gene → disease criteria from indexed records")]
struct Args {
    /// Criteria config (TOML or YAML).
    #[arg(short, long, env = CONFIG_ENV_VAR, default_value = "locitag.toml")]
    config: PathBuf,

    /// JSON fixture holding the source and lookup collections.
    #[arg(long, required_unless_present = "list")]
    fixture: Option<PathBuf>,

    /// Section to run; repeatable. Defaults to every section of --feature.
    #[arg(short, long)]
    section: Vec<String>,

    /// Feature type whose sections run when no --section is given.
    #[arg(long, default_value = "gene")]
    feature: String,

    /// Directory for criteria files of sections without their own `output`.
    #[arg(short, long, default_value = "criteria")]
    out: PathBuf,

    /// Print the scan report of each section as JSON on stdout.
    #[arg(long)]
    report: bool,

    /// List registered normalizers and configured sections, then exit.
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("locitag=debug,info")),
        )
        .init();

    let args = Args::parse();
    info!("Locitag {}", env!("CARGO_PKG_VERSION"));

    let config = CriteriaConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let registry = NormalizerRegistry::with_defaults();
    registry.validate(&config)?;
    info!(
        genome_build = %config.genome_build,
        sections = config.sections.len(),
        "Configuration loaded"
    );

    if args.list {
        for (feature, names) in registry.available() {
            println!("normalizers[{}]: {}", feature, names.join(", "));
        }
        for (name, section) in &config.sections {
            println!(
                "section {}: {} via {}",
                name,
                section.source,
                config.normalizer_name(name)?
            );
        }
        return Ok(());
    }

    let Some(fixture) = args.fixture.as_deref() else {
        bail!("--fixture is required");
    };
    let store = MemoryStore::from_fixture(fixture)
        .await
        .with_context(|| format!("loading fixture {}", fixture.display()))?;

    let sections: Vec<String> = if args.section.is_empty() {
        config.sections_for_feature(&args.feature).map(String::from).collect()
    } else {
        args.section.clone()
    };
    if sections.is_empty() {
        warn!(feature = %args.feature, "No sections configured for feature");
        return Ok(());
    }

    let (progress_tx, mut progress_rx) = broadcast::channel::<ScanProgress>(64);
    let progress_log = tokio::spawn(async move {
        while let Ok(p) = progress_rx.recv().await {
            if p.state == ScanState::Scanning {
                info!(section = %p.section, pages = p.pages, records = p.records_seen, evidence = p.evidence_added, "Scan progress");
            }
        }
    });

    let driver = ScanDriver::new(&store, &registry, &config).with_progress(progress_tx);
    let mut load_failures = 0;

    for section in &sections {
        let loader = match config.section(section)?.output.clone() {
            Some(path) => JsonFileLoader::to_file(path),
            None => JsonFileLoader::in_dir(&args.out),
        };
        let outcome = driver.run(section, &loader).await?;

        if let Err(ref e) = outcome.load {
            warn!(section = %section, error = %e, "Criteria not written");
            load_failures += 1;
        } else {
            info!(
                section = %section,
                genes = outcome.aggregate.gene_count(),
                path = %loader.output_path(&outcome.report.feature, section).display(),
                "Section done"
            );
        }
        if args.report {
            println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        }
    }

    drop(driver);
    let _ = progress_log.await;

    if load_failures > 0 {
        bail!("{} section(s) could not be written", load_failures);
    }
    Ok(())
}
