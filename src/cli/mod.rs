//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::segment::SegmentStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    about = "Retrieval and reranking pipeline for grounded question answering",
    long_about = "Ragline segments documents into chunks, indexes them by content and by the questions \
                  they answer, and retrieves, reranks and assembles cited context for answers from a \
                  local generation model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragline/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment, embed and store plain-text files
    Ingest {
        /// Files to ingest; each file is one source
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Chunking strategy (fixed or structure)
        #[arg(short, long)]
        strategy: Option<SegmentStrategy>,
    },

    /// Ingest rows from a JSON Lines file, one object per line
    IngestRows {
        /// JSONL file path
        file: PathBuf,

        /// Column holding each row's source identifier
        #[arg(long)]
        id_field: Option<String>,

        /// Column holding an explicit question for each row
        #[arg(long)]
        question_field: Option<String>,
    },

    /// Retrieve ranked chunks without generating an answer
    Search {
        /// Search query text
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum hybrid similarity in [0, 1]
        #[arg(short = 'm', long)]
        min_similarity: Option<f32>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the indexed documents
    Ask {
        /// Question to ask
        question: String,

        /// Number of context chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum hybrid similarity in [0, 1]
        #[arg(short = 'm', long)]
        min_similarity: Option<f32>,

        /// Print server-sent-event frames as the answer streams
        #[arg(long)]
        stream: bool,
    },

    /// Remove every stored chunk
    Clear,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
