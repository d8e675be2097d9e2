//! Install progress with CI fallback

use super::context::UiContext;
use crate::worker::InstallProgress;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

/// Progress bar over the asset list of one install.
///
/// Shows an indicatif bar in interactive mode and one line per asset
/// otherwise.
pub struct InstallProgressBar {
    bar: Option<ProgressBar>,
}

impl InstallProgressBar {
    pub fn new(ctx: &UiContext) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new(0);
            let template = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} Precaching {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("━╸─");
            bar.set_style(template);
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

impl InstallProgress for InstallProgressBar {
    fn on_start(&self, cache: &str, total: usize) {
        match self.bar {
            Some(ref bar) => {
                bar.set_prefix(cache.to_string());
                bar.set_length(total as u64);
            }
            None => println!("Precaching {} asset(s) into {}", total, cache),
        }
    }

    fn on_asset_fetched(&self, url: &Url, bytes: u64) {
        match self.bar {
            Some(ref bar) => {
                bar.set_message(url.path().to_string());
                bar.inc(1);
            }
            None => println!("  {} {} ({} bytes)", style("[OK]").green(), url, bytes),
        }
    }

    fn on_asset_failed(&self, url: &Url, error: &str) {
        match self.bar {
            Some(ref bar) => bar.println(format!("  {} {}: {}", style("✗").red(), url, error)),
            None => println!("  {} {}: {}", style("[FAIL]").red(), url, error),
        }
    }
}
