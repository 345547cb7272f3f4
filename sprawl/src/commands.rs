use clap::{arg, command};
use std::path::PathBuf;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sprawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sprawl")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl outward from a seed URL, recording the shortest known path to every \
                registrable domain reached.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The seed URL to crawl from (http:// is assumed when no scheme is given)"),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Hops from the seed at which pages are recorded but no longer fetched")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("1"),
                )
                .arg(
                    arg!(--"timeout-ms" <MILLISECONDS>)
                        .required(false)
                        .help("Per-request timeout in milliseconds")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("1000"),
                )
                .arg(
                    arg!(-c --"max-concurrent" <NUM_FETCHES>)
                        .required(false)
                        .help("Cap on fetches in flight at once (default: unlimited)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Snapshot file the tree is appended to")
                        .default_value("urls.txt"),
                )
                .arg(
                    arg!(--"no-snapshot")
                        .required(false)
                        .help("Do not write a snapshot file")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"suffix-list" <PATH>)
                        .required(false)
                        .help("Full public suffix list to use instead of the bundled one"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-p --"path" <DOMAIN>)
                        .required(false)
                        .help("Report the shortest path from the seed to this domain (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-r --"report" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Print every discovery as it happens")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("path")
                .about("Show the shortest path from the seed to a domain, using a saved snapshot")
                .arg(
                    arg!(<DOMAIN>)
                        .required(true)
                        .num_args(1..)
                        .help("The domain(s) to trace back to the seed"),
                )
                .arg(
                    arg!(-s --"snapshot" <PATH>)
                        .required(false)
                        .help("Snapshot file written by a previous crawl")
                        .default_value("urls.txt"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}
