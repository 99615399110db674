use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::mapping::MappingOverrides;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Bulk-load delimited extracts into a wide-column store",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream a delimited extract into the mapped table
    Load(LoadArgs),
    /// Print the column plan for an extract without writing anything
    Plan(PlanArgs),
}

/// Input, mapping, and store arguments shared by every command.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Delimited input file ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// JSON mapping document
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// YAML catalog describing keyspaces, tables, and column types
    #[arg(long = "catalog")]
    pub catalog: PathBuf,
    /// Optional YAML settings file
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Target keyspace
    #[arg(short = 'k', long = "keyspace")]
    pub keyspace: Option<String>,
    /// Target table, replacing the one named by the mapping document
    #[arg(short = 't', long = "table")]
    pub table: Option<String>,
    /// Additional synthetic columns as `column=value[,column=value...]`
    #[arg(long = "synthetics", action = ArgAction::Append)]
    pub synthetics: Vec<String>,
    /// Additional comma-separated columns filled with the run timestamp
    #[arg(long = "timestamps", action = ArgAction::Append)]
    pub timestamps: Vec<String>,
    /// Additional comma-separated columns filled with the data line number
    #[arg(long = "linenumbers", action = ArgAction::Append)]
    pub linenumbers: Vec<String>,
    /// Additional comma-separated columns filled with a random uuid
    #[arg(long = "uuids", action = ArgAction::Append)]
    pub uuids: Vec<String>,
    /// Reject unmapped headers instead of matching them to columns by name
    #[arg(long = "strict-mapping", value_name = "BOOL", action = ArgAction::Set)]
    pub strict_mapping: Option<bool>,
    /// Field delimiter (supports 'tab', ',', ';', '|'); defaults to tab
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

impl SourceArgs {
    pub fn overrides(&self, strict: bool) -> MappingOverrides {
        MappingOverrides {
            table: self.table.clone(),
            synthetics: self.synthetics.clone(),
            timestamps: self.timestamps.clone(),
            linenumbers: self.linenumbers.clone(),
            uuids: self.uuids.clone(),
            strict: Some(strict),
        }
    }
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Maximum number of writes in flight before they are awaited
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// Maximum number of prepared statements kept
    #[arg(long = "statement-cache")]
    pub statement_cache: Option<usize>,
    /// Leading data lines sampled to estimate progress
    #[arg(long = "progress-sample")]
    pub progress_sample: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
