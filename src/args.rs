//! Command-line argument parsing for the bridge CLI.

use std::env;
use std::path::PathBuf;

use ds4qb_bridge::ProtocolVariant;

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// JSON config file
    pub config: Option<PathBuf>,
    /// Protocol override
    pub protocol: Option<ProtocolVariant>,
    /// Guest disk root override
    pub root: Option<PathBuf>,
    /// Guest working directory override
    pub working_dir: Option<String>,
    /// Whether help was requested
    pub show_help: bool,
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(env::args().skip(1))
    }

    /// Parse an argument list without the program name.
    pub fn parse_from(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = Self::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
                _ => (arg.clone(), None),
            };
            match flag.as_str() {
                "--help" | "-h" => parsed.show_help = true,
                "--config" | "--protocol" | "--root" | "--working-dir" => {
                    let Some(value) = inline.or_else(|| iter.next()) else {
                        eprintln!("{flag} requires an argument");
                        parsed.show_help = true;
                        continue;
                    };
                    match flag.as_str() {
                        "--config" => parsed.config = Some(PathBuf::from(value)),
                        "--root" => parsed.root = Some(PathBuf::from(value)),
                        "--working-dir" => parsed.working_dir = Some(value),
                        _ => match ProtocolVariant::from_name(&value) {
                            Some(protocol) => parsed.protocol = Some(protocol),
                            None => {
                                eprintln!("Unknown protocol: {value}");
                                parsed.show_help = true;
                            }
                        },
                    }
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    parsed.show_help = true;
                }
            }
        }

        parsed
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  ds4qb-bridge [--config FILE] [--protocol binary|token|clipboard] [--root DIR] [--working-dir PATH]\n\n\
             Flags:\n\
             \x20 --config FILE         JSON adapter configuration\n\
             \x20 --protocol NAME       DS4QB generation:\n\
             \x20                         - binary    DS4QB++ (default)\n\
             \x20                         - token     DS4QB2\n\
             \x20                         - clipboard DS4QB1\n\
             \x20 --root DIR            Host directory mounted as the guest disk\n\
             \x20 --working-dir PATH    Guest working directory of the program\n\
             \x20 -h, --help            Show this help\n\n\
             Logging is controlled with RUST_LOG (default: info).\n\
             Type q and Enter to stop.\n"
        );
    }
}
