use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use encoding_rs::Encoding;
use owo_colors::OwoColorize;

use pipreq_hash::HashAlgorithm;
use pipreq_requirements_txt::ParseOptions;

use crate::commands::ExitStatus;

mod commands;
mod logging;

#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any log output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the requirements, invalid lines, comments and options of a requirements file as JSON.
    Parse(ParseArgs),
    /// Print a requirements file as pip reads it, with continuations joined.
    Dump(DumpArgs),
    /// Print the `--hash` option for a local archive.
    Hash(HashArgs),
}

#[derive(Args)]
struct FileArgs {
    /// The requirements file to read.
    file: PathBuf,

    /// Don't follow `-r` and `-c` into nested requirements files.
    #[arg(
        long,
        env = "PIPREQ_NO_NESTED",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    no_nested: bool,

    /// The encoding of files without a byte order mark or a `coding:` declaration.
    ///
    /// Accepts any WHATWG encoding label, such as `utf-8`, `latin1` or `windows-1252`.
    #[arg(long, env = "PIPREQ_DEFAULT_ENCODING", value_parser = parse_encoding)]
    default_encoding: Option<&'static Encoding>,
}

impl FileArgs {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            include_nested: !self.no_nested,
            default_encoding: self
                .default_encoding
                .unwrap_or(ParseOptions::default().default_encoding),
        }
    }
}

#[derive(Args)]
struct ParseArgs {
    #[command(flatten)]
    file_args: FileArgs,

    /// Include the file each line was read from.
    #[arg(long)]
    include_filename: bool,

    /// Exit with an error if any line could not be parsed.
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct DumpArgs {
    #[command(flatten)]
    file_args: FileArgs,
}

#[derive(Args)]
struct HashArgs {
    /// The archive to hash.
    file: PathBuf,

    /// The digest algorithm: `md5`, `sha1`, `sha224`, `sha256`, `sha384` or `sha512`.
    #[arg(long, short, default_value = "sha256")]
    algorithm: HashAlgorithm,
}

fn parse_encoding(label: &str) -> Result<&'static Encoding, String> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| format!("unknown encoding `{label}`"))
}

fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.quiet {
        logging::Level::Quiet
    } else if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    })?;

    match cli.command {
        Commands::Parse(args) => commands::parse(
            &args.file_args.file,
            &args.file_args.parse_options(),
            args.include_filename,
            args.strict,
        ),
        Commands::Dump(args) => commands::dump(&args.file_args.file, &args.file_args.parse_options()),
        Commands::Hash(args) => commands::hash(&args.file, args.algorithm),
    }
}

fn main() -> ExitCode {
    match inner() {
        Ok(code) => code.into(),
        Err(err) => {
            let mut causes = err.chain();
            if let Some(cause) = causes.next() {
                anstream::eprintln!("{}: {}", "error".red().bold(), cause);
            }
            for err in causes {
                anstream::eprintln!("  {}: {}", "Caused by".red().bold(), err);
            }
            ExitStatus::Error.into()
        }
    }
}
