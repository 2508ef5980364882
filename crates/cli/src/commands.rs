//! Clap command definition.
//!
//! The connection string is the only argument; everything else comes from
//! `feedcheck.toml`.

use clap::{Arg, Command};

/// Connection string used when none is given: the three local `mongos`
/// routers of a development cluster, default database `test`.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017,localhost:27018,localhost:27019/test";

/// Build the CLI.
pub fn build_cli() -> Command {
    Command::new("feedcheck")
        .about("Checks a sharded collection's change stream against point reads")
        .arg(
            Arg::new("uri")
                .help("Connection string, with the database to use as its path")
                .default_value(DEFAULT_URI),
        )
}

/// Connection string from parsed arguments
pub fn uri(matches: &clap::ArgMatches) -> &str {
    matches
        .get_one::<String>("uri")
        .map(String::as_str)
        .unwrap_or(DEFAULT_URI)
}
