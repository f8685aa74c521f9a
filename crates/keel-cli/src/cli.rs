use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keel",
    about = "Keel — type dictionary, id strategy and configuration tooling",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect and format type dictionary files
    Dict(DictArgs),
    /// Work with id strategy strings
    Ids(IdsArgs),
    /// Validate persistence configuration files
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct DictArgs {
    #[command(subcommand)]
    pub action: DictAction,
}

#[derive(Subcommand)]
pub enum DictAction {
    /// Parse a dictionary and report problems
    Check { file: PathBuf },
    /// Rewrite a dictionary in canonical form
    Fmt {
        file: PathBuf,
        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },
    /// List the types of a dictionary
    Show { file: PathBuf },
}

#[derive(Args)]
pub struct IdsArgs {
    #[command(subcommand)]
    pub action: IdsAction,
}

#[derive(Subcommand)]
pub enum IdsAction {
    /// Parse a strategy, e.g. `Transient(1000)` or `Type:'None', Object:'Transient'`
    Parse { strategy: String },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load a config file and print it with all defaults filled in
    Check { file: PathBuf },
}
