//! Identifier loop shared by the classification subcommands.

use crate::error::ClassifyError;
use crate::output::SkipLog;
use crate::training::signal_name;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

/// Log a skip condition to `skip_log`, or pass a hard error through
pub fn skip_or_fail(
    skip_log: &SkipLog,
    err: anyhow::Error,
    identifier: &str,
    training_data: &str,
    shuffle_labels: bool,
) -> Result<()> {
    match err.downcast_ref::<ClassifyError>().and_then(|e| e.skip_reason()) {
        Some(reason) => {
            warn!("Skipping {} ({}): {}", identifier, reason, err);
            skip_log.append(identifier, training_data, shuffle_labels, reason)
        }
        None => Err(err.context(format!("Experiment failed for {}", identifier))),
    }
}

/// Run `experiment` for every identifier, real labels first then shuffled
///
/// Skip conditions are logged and the loop moves on; any other error stops it.
pub fn run_identifiers<F>(
    skip_log: &SkipLog,
    training_data: &str,
    label: &str,
    identifiers: &[String],
    mut experiment: F,
) -> Result<()>
where
    F: FnMut(&str, bool) -> Result<()>,
{
    for shuffle_labels in [false, true] {
        info!("shuffle_labels: {}", shuffle_labels);
        let pb = ProgressBar::new(identifiers.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{msg:30} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .context("Invalid progress bar template")?
                .progress_chars("=> "),
        );

        for identifier in identifiers {
            pb.set_message(format!("{}: {}", label, identifier));
            if let Err(e) = experiment(identifier, shuffle_labels) {
                skip_or_fail(skip_log, e, identifier, training_data, shuffle_labels)?;
            }
            pb.inc(1);
        }
        pb.finish_with_message(format!("{} ({})", label, signal_name(shuffle_labels)));
    }
    Ok(())
}
