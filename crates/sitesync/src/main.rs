//! `sitesync`: inspect and repair the site's content from a terminal.

/// CLI module - command-line interface for sitesync
mod cli;

fn main() {
    cli::run_cli();
}
