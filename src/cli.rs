use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands::normalize::{self, NormalizeOptions};
use crate::commands::status;
use crate::commands::verify::{self, VerifyOptions};
use crate::audit::reconcile::Side;
use crate::commands::CommandReport;

#[derive(Parser)]
#[command(
    name = "audit-verify",
    about = "Cross-check a live audit-log export against its immutable archive copy",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the live export with the archive and report discrepancies
    Verify {
        /// Live export JSON (`{"documents": [...]}` or an array)
        #[arg(long)]
        live: PathBuf,

        /// Directory of archived audit JSON files (searched recursively)
        #[arg(long)]
        archive: PathBuf,

        /// Also fail when matched records differ in nested content
        #[arg(long)]
        strict: bool,

        /// Do not append this run to the verify ledger
        #[arg(long)]
        no_ledger: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical form of every record in a file or directory
    Normalize {
        /// Record file (export, array or single record) or archive directory
        #[arg(long)]
        input: PathBuf,

        /// Read the input as the live export or as archive entries
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Show equivalence hash and deep digest instead of canonical JSON
        #[arg(long)]
        hash: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved paths, configuration and recognized AUDIT_* variables
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceArg {
    #[value(name = "live")]
    Live,
    #[value(name = "archive")]
    Archive,
}

impl From<SourceArg> for Side {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Live => Side::Live,
            SourceArg::Archive => Side::Archive,
        }
    }
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for detail in &report.details {
        println!("  {detail}");
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}

/// Run the parsed command. Returns whether the report came back clean.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();

    let (report, json) = match cli.command {
        Commands::Verify {
            live,
            archive,
            strict,
            no_ledger,
            json,
        } => (
            verify::run(&VerifyOptions {
                live,
                archive,
                strict,
                no_ledger,
            })?,
            json,
        ),
        Commands::Normalize {
            input,
            source,
            hash,
            json,
        } => (
            normalize::run(&NormalizeOptions {
                input,
                source: source.map(Side::from),
                hash,
            })?,
            json,
        ),
        Commands::Status { json } => (status::run()?, json),
    };

    print_report(&report, json)?;
    Ok(report.ok)
}
