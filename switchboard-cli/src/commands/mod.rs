//! CLI command implementations

mod config;
mod list;
mod run;

pub use config::{config, ConfigArgs};
pub use list::{list_sources, ListArgs};
pub use run::{run, RunArgs};
