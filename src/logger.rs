use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Dependencies log at `Warn`; this crate at `Info`, or `Debug` when verbose.
/// A set `RUST_LOG` replaces these defaults entirely.
pub fn setup_logging(verbose: bool) {
    let filters = filter_directives(verbose, std::env::var("RUST_LOG").ok());

    let mut builder = Builder::new();
    builder.parse_filters(&filters);
    builder
        .format(|buf, record| {
            let tag = match record.level() {
                Level::Error => "[-]".red(),
                Level::Warn => "[!]".yellow(),
                Level::Info => "[+]".green(),
                Level::Debug | Level::Trace => "[*]".cyan(),
            };
            writeln!(buf, "{} {}", tag, record.args())
        })
        .init();
}

fn filter_directives(verbose: bool, rust_log: Option<String>) -> String {
    match rust_log {
        Some(filters) if !filters.trim().is_empty() => filters,
        _ => {
            let level = if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            };
            format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level)
        }
    }
}
