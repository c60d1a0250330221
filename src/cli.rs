use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::extractor::PinExtractor;
use crate::trust::load_trust_anchors;
use crate::types::{
    OutputFormat, PinOptions, Target, TrustSource, DEFAULT_HASH_ALGORITHM, DEFAULT_TIMEOUT_MS,
};
use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sslpin")]
#[command(
    version,
    about = "Generate public-key pins for every certificate a TLS host presents",
    long_about = None,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[arg(help = "Target host[:port] (port defaults to 443), or 'help'")]
    pub target: Option<String>,

    #[arg(help = "Hash algorithm, e.g. SHA-1, SHA-256, SHA-512 [default: SHA-256]")]
    pub algorithm: Option<String>,

    #[arg(help = "Pass 'debug' to print subject and expiry of every certificate")]
    pub mode: Option<String>,

    #[arg(
        short,
        long,
        default_value_t = DEFAULT_TIMEOUT_MS,
        help = "Connect and handshake timeout in milliseconds"
    )]
    pub timeout: u64,

    #[arg(long, help = "Complete chains from this PEM bundle instead of the system store")]
    pub ca_file: Option<PathBuf>,

    #[arg(long, conflicts_with = "ca_file", help = "Do not complete chains from any trust store")]
    pub no_trust_store: bool,

    #[arg(short, long, default_value = "lines", help = "Output format: lines or json")]
    pub format: String,
}

/// What a command line asks for.
#[derive(Debug)]
pub enum Invocation {
    Help,
    Generate(PinOptions),
}

impl Cli {
    pub fn into_invocation(self) -> Result<Invocation> {
        let target = match self.target {
            None => return Ok(Invocation::Help),
            Some(t) if t.eq_ignore_ascii_case("help") => return Ok(Invocation::Help),
            Some(t) => t.parse::<Target>()?,
        };

        let algorithm = self
            .algorithm
            .unwrap_or_else(|| DEFAULT_HASH_ALGORITHM.to_string());

        let debug = match self.mode {
            Some(m) if m.eq_ignore_ascii_case("debug") => true,
            Some(m) => {
                warn!("Ignoring unknown mode '{}'", m);
                false
            }
            None => false,
        };

        let trust_source = match (self.ca_file, self.no_trust_store) {
            (Some(path), _) => TrustSource::PemFile(path),
            (None, true) => TrustSource::Disabled,
            (None, false) => TrustSource::Native,
        };

        let options = PinOptions::new(target, algorithm)?
            .with_debug(debug)
            .with_timeout_ms(self.timeout)?
            .with_trust_source(trust_source)
            .with_format(self.format.parse::<OutputFormat>()?);

        Ok(Invocation::Generate(options))
    }
}

/// Parses a full argument vector (program name first) without touching the
/// network.
pub fn parse_invocation<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| Error::InvalidArgument(e.to_string()))?;
    cli.into_invocation()
}

pub fn help_text() -> String {
    format!(
        "{}\n{}\n\n{}",
        "##SSL pin set generator##".bold().cyan(),
        "The generated pinset are base-64 encoded hashes (default SHA-256). \
         Note: only run this on a trusted network.",
        "Usage: \"sslpin <host>[:port] [hashAlgorithm] [debug]\" i.e., example.com:443 sha-256"
    )
}

pub fn print_help() {
    println!("{}", help_text());
}

/// Usage errors lead with the complaint, anything else leads with the usage.
pub fn error_report(err: &Error) -> String {
    if err.is_usage_error() {
        format!("{} {}\n{}", "CLI Error:".red().bold(), err, help_text())
    } else {
        format!(
            "{}\n\n{} {}",
            help_text(),
            "Whoops something went wrong:".red().bold(),
            err
        )
    }
}

/// Prints an error the way the tool reports everything: on stdout, with
/// usage, and without affecting the exit status.
pub fn report_error(err: &Error) {
    println!("{}", error_report(err));
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Runs one pin-generation: progress line, handshake, pins.
pub fn generate(options: &PinOptions) -> Result<()> {
    println!("{}", "**Run this on a trusted network**".yellow().bold());
    println!("Generating SSL pins for: {}", options.target.host);

    let anchors = load_trust_anchors(&options.trust_source)?;
    debug!("{} trust anchors available for chain completion", anchors.len());

    let extractor = PinExtractor::from_options(options, anchors);
    let extractor = match options.format {
        OutputFormat::Lines => extractor,
        #[cfg(feature = "json")]
        OutputFormat::Json => extractor.with_sink(std::io::sink()),
    };
    let extractor = Arc::new(extractor);

    let result = Connector::new(options.target.clone(), options.timeout).run(extractor.clone());

    print_report(options, &extractor)?;

    result
}

/// Non-streaming formats print once the handshake is over, whatever its outcome.
#[cfg(feature = "json")]
fn print_report(options: &PinOptions, extractor: &PinExtractor) -> Result<()> {
    if options.format == OutputFormat::Json {
        let json = crate::extractor::display_json(&options.target, &extractor.emitted())?;
        println!("{}", json);
    }
    Ok(())
}

#[cfg(not(feature = "json"))]
fn print_report(_options: &PinOptions, _extractor: &PinExtractor) -> Result<()> {
    Ok(())
}

pub fn run_cli() -> Result<()> {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            println!("{}", e);
            return Ok(());
        }
        Err(e) => return Err(Error::InvalidArgument(e.to_string())),
    };

    match cli.into_invocation()? {
        Invocation::Help => {
            print_help();
            Ok(())
        }
        Invocation::Generate(options) => generate(&options),
    }
}
