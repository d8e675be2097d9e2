//! Terminal output
//!
//! `cliclack` and `indicatif` in interactive terminals, plain prefixed lines
//! in CI and when output is piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{intro, key_value, outro_success, remark, step_ok_detail, step_warn_hint};
pub use progress::InstallProgressBar;
