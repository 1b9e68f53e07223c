use std::fs::File;
use std::path::Path;

use anyhow::Context as _;
use chrono::Utc;

use super::Context;
use crate::report;

/// Fetches the profile and every stored assessment, prints a summary and
/// optionally writes the markdown report and a CSV of number trials.
pub async fn run(ctx: &Context, out: Option<&Path>, csv: Option<&Path>) -> anyhow::Result<()> {
    let credential = ctx.credential()?;
    let profile = ctx
        .backend
        .fetch_profile(&credential)
        .await
        .context("failed to load the profile")?;
    let assessments = ctx
        .backend
        .fetch_assessments(&credential)
        .await
        .context("failed to load assessments")?;

    let name = profile.username.as_deref().unwrap_or(&profile.email);
    if assessments.is_empty() {
        println!("No assessments for {name} yet.");
    } else {
        println!("Assessments for {name}:");
        for line in report::console_summary(&assessments) {
            println!("{line}");
        }
    }

    if let Some(out) = out {
        let report = report::build_report(&profile, &assessments, Utc::now());
        std::fs::write(out, report)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Report written to {}.", out.display());
    }

    if let Some(path) = csv {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let rows = report::write_trials_csv(file, &assessments)?;
        println!("Wrote {rows} trials to {}.", path.display());
    }

    Ok(())
}
