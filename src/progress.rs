use indicatif::{ProgressBar, ProgressStyle};

use crate::confluence::PublishOutcome;
use crate::error::PublishError;

/// Spinner shown on stderr while the page is being published.
pub fn publish_spinner(title: &str, space: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Publishing \"{title}\" to space {space}"));
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

pub fn finish_publish(pb: &ProgressBar, result: &Result<PublishOutcome, PublishError>) {
    let message = match result {
        Ok(PublishOutcome::Created { id }) => format!("✓ {} (created page {id})", pb.message()),
        Ok(PublishOutcome::Updated { id, version }) => {
            format!("✓ {} (page {id} now at version {version})", pb.message())
        }
        Err(_) => format!("✗ {}", pb.message()),
    };
    pb.finish_with_message(message);
}
