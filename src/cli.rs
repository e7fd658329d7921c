use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Vault root (defaults to the current directory)
    #[clap(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Directory holding config.yaml, the embedding store and the query cache
    /// (defaults to <vault>/_scripts)
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[clap(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate api docs in markdown format
    #[cfg(feature = "markdown-docs")]
    #[clap(hide = true)]
    MarkdownDocs {},

    /// Embed every note section and replace the store
    Build {
        /// Skip the cost confirmation
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Embed only sections missing from the store.
    /// Notes edited since they were embedded keep their old vectors;
    /// run `build` to refresh them.
    Update {
        /// Skip the cost confirmation
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Find the sections most similar to a query
    Query {
        /// Free text, used verbatim
        text: String,

        /// Number of results
        #[clap(short, long, default_value = "10")]
        n: usize,

        /// Print results as json
        #[clap(long, default_value = "false")]
        json: bool,

        /// Pick a result and print its obsidian:// link
        #[clap(short, long, default_value = "false")]
        open: bool,
    },

    /// Show what is embedded and what is pending
    Status {
        /// Print status as json
        #[clap(long, default_value = "false")]
        json: bool,
    },
}
