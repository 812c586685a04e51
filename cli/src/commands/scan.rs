//! Scan command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use stratum_core::config::ScanConfig;
use stratum_core::report::ScanStatus;
use stratum_scanner::advisory::{AdvisoryStore, TrustAnchor};
use stratum_scanner::matcher::ComparatorRegistry;
use stratum_scanner::publish::MqttPublisher;
use stratum_scanner::{ImageReference, Scanner};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct ScanArgs {
    /// Image reference to scan (e.g. ghcr.io/acme/app:v1)
    pub image: String,

    /// Override the advisory bundle directory
    #[arg(long)]
    pub advisories: Option<PathBuf>,

    /// Override the trust anchor key file
    #[arg(long)]
    pub trust_anchor: Option<PathBuf>,

    /// Print the result as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Skip publishing to the message bus
    #[arg(long)]
    pub no_publish: bool,
}

pub async fn run(mut config: ScanConfig, args: ScanArgs) -> anyhow::Result<()> {
    if let Some(dir) = args.advisories {
        config.advisory.bundle_dir = dir;
    }
    if let Some(path) = args.trust_anchor {
        config.advisory.trust_anchor = path;
    }

    let reference = ImageReference::parse(&args.image)?;
    tracing::debug!(reference = %reference, "Parsed scan target");

    let anchor = TrustAnchor::load(&config.advisory.trust_anchor)?;
    let store = AdvisoryStore::load(
        &config.advisory.bundle_dir,
        &anchor,
        &ComparatorRegistry::with_builtin(),
    )?;

    let broker = config.broker.clone();
    let scanner = Scanner::new(config, Arc::new(store));

    // Ctrl-C cancels the scan; nothing is published for a cancelled scan.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    let result = if args.no_publish {
        scanner.scan_cancellable(&reference, &cancel).await?
    } else {
        let publisher = MqttPublisher::new(broker);
        let outcome = scanner
            .scan_and_publish(&reference, &publisher, &cancel)
            .await?;
        if let Some(e) = outcome.publish_error {
            eprintln!("Warning: result publishing failed: {e}");
        }
        outcome.result
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if result.status == ScanStatus::Failed {
        anyhow::bail!(
            "scan failed: {}",
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn print_summary(result: &stratum_core::report::ScanResult) {
    println!("Image:    {}", result.image);
    if let Some(ref digest) = result.manifest_digest {
        println!("Manifest: {}", digest);
    }
    if let Some(ref os) = result.os_release {
        if let Some(name) = os.pretty_name.as_deref().or(os.name.as_deref()) {
            println!("OS:       {}", name);
        }
    }
    println!("Status:   {:?}", result.status);
    println!("Findings: {}", result.findings.len());

    for finding in &result.findings {
        println!(
            "  {}  {}  {} {} {} (installed {})",
            finding.advisory_id,
            finding.severity.score,
            finding.package.name,
            finding.range.op,
            finding.range.boundary,
            finding.package.version,
        );
    }

    if !result.warnings.is_empty() {
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  {}", warning);
        }
    }
}
