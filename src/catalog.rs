//! Engine capability listings (`collab matchers`, `collab strategies`).
//!
//! These never touch the database; they print the catalog resolved from
//! configuration.

use anyhow::Result;

use crate::config::Config;
use crate::output::print_json;

pub fn run_matchers(config: &Config) -> Result<()> {
    print_json(&config.catalog().matchers)
}

pub fn run_strategies(config: &Config) -> Result<()> {
    print_json(&config.catalog().strategies)
}
