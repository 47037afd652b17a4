//! CLI module for Vitals commands.
//!
//! Every command runs in-process: `scrape` and `health` build a runtime,
//! run one collection cycle and print the result.
//!
//! ## Usage
//!
//! ```bash
//! vitals-cli scrape          # Print exposition text
//! vitals-cli health          # Print health summary, exits 0 on healthy
//! vitals-cli config show     # Print effective configuration
//! ```

pub mod config_cmd;
pub mod probe_cmd;

pub use probe_cmd::{run_health, run_scrape};
