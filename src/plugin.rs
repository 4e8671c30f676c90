//! End-of-session entry point: the host test runner calls [`finalize`] once.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::confluence::{self, PublishOutcome};
use crate::progress::{finish_publish, publish_spinner};
use crate::render::render_page;
use crate::results::parse_junit_xml;
use crate::settings::load_settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Upload was not requested; nothing was read or sent.
    Skipped,
    Published(PublishOutcome),
}

/// Header line shown at the top of a test session.
pub fn report_header() -> String {
    format!("Running on {} platform", std::env::consts::OS)
}

/// Load settings, parse and render the results, and publish them once.
///
/// Errors are returned to the caller; they never alter the test run's own outcome.
pub async fn finalize(
    xml_path: &Path,
    settings_path: &Path,
    upload_requested: bool,
) -> Result<FinalizeOutcome> {
    if !upload_requested {
        debug!("confluence upload not requested");
        return Ok(FinalizeOutcome::Skipped);
    }

    info!("Uploading testing results to Confluence ...");
    let settings = load_settings(settings_path)?;
    debug!(?settings, "settings loaded");

    let summary = parse_junit_xml(xml_path)?.with_platform(report_header());
    for mismatch in &summary.mismatches {
        warn!(%mismatch, "results file totals disagree with its test cases");
    }
    info!(
        total = summary.counts.total,
        passed = summary.counts.passed,
        failed = summary.counts.failed,
        skipped = summary.counts.skipped,
        errors = summary.counts.errors,
        "parsed {}",
        xml_path.display()
    );

    let body = render_page(&summary)
        .with_context(|| format!("Failed to render {}", xml_path.display()))?;

    let pb = publish_spinner(&settings.page.title, &settings.space);
    let result = confluence::publish_page(&settings, &body).await;
    finish_publish(&pb, &result);

    let outcome = result.with_context(|| {
        format!(
            "Failed to publish \"{}\" to {} (space {})",
            settings.page.title, settings.url, settings.space
        )
    })?;
    Ok(FinalizeOutcome::Published(outcome))
}
