//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "coral", version, about = "Chat with a Coral backend from the terminal")]
pub struct Cli {
    /// Config file (defaults to <config dir>/coral/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a message and stream the answer (Ctrl-C stops it)
    Chat {
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Tool the model may use; repeatable
        #[arg(long = "tool")]
        tools: Vec<String>,
        /// Uploaded file id to attach; repeatable
        #[arg(long = "file")]
        file_ids: Vec<String>,
        /// Print the final conversation as JSON instead of sources
        #[arg(long)]
        json: bool,
    },
    /// Print a stored conversation with its citations
    Show { conversation: String },
    /// Convert markdown tables to CSV (or TSV)
    Table {
        /// Markdown file; reads stdin when omitted
        file: Option<PathBuf>,
        #[arg(long)]
        tsv: bool,
    },
}
