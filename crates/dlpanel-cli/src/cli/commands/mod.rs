//! CLI command handlers. Each command is in its own file.

mod catalog;
pub(super) mod follow;
mod jobs;
mod parse_progress;
mod remote;

pub use catalog::run_catalog;
pub use jobs::{run_batch, run_fetch, run_install_tool};
pub use parse_progress::run_parse_progress;
pub use remote::{run_status, run_stop};
