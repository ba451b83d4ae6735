//! Binary entrypoint for the snippets plugin.

use std::io::{self, Write};

use beacon_plugin_snippets::SnippetsPlugin;
use beacon_plugins::sdk::run;

fn main() {
    if let Err(error) = run::<SnippetsPlugin>() {
        writeln!(io::stderr().lock(), "{error}").ok();
        std::process::exit(1);
    }
}
