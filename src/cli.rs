use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "concert-program",
    version = env!("CARGO_PKG_VERSION"),
    about = "Interactive concert program: scan concerts, keep favorites and a concert journal",
    long_about = None
)]
pub struct Cli {
    /// Override the local storage database path
    #[arg(global = true, long = "storage")]
    pub storage: Option<PathBuf>,

    /// Override the config file path
    #[arg(global = true, long = "config")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a concert from a decoded QR payload (id or concert link)
    Scan { payload: String },

    /// Show a concert's performers, program and sponsors
    Show { id: String },

    /// Concerts acquired by scanning
    Scanned {
        #[command(subcommand)]
        action: ScannedAction,
    },

    /// Bookmarked concerts
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },

    /// Concert journal
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },

    /// Browse known concerts
    Browse {
        /// Show past concerts instead of upcoming ones
        #[arg(long)]
        past: bool,

        /// Filter by title or venue
        #[arg(long, short = 'q')]
        query: Option<String>,
    },

    /// Prune scanned concerts that no longer exist remotely
    Sync {
        /// Run even if the last sync is recent
        #[arg(long)]
        force: bool,
    },

    /// Keep syncing in the background until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum ScannedAction {
    List,
    Clear,
}

#[derive(Subcommand)]
pub enum SavedAction {
    List,
    /// Save a concert by id
    Add { id: String },
    Remove { id: String },
    Clear,
}

#[derive(Subcommand)]
pub enum JournalAction {
    List,
    Show {
        id: String,
    },
    New {
        #[command(flatten)]
        fields: JournalFields,

        /// Prefill title, date and venue from a known concert
        #[arg(long)]
        concert: Option<String>,
    },
    Edit {
        id: String,

        #[command(flatten)]
        fields: JournalFields,
    },
    Delete {
        id: String,
    },
}

#[derive(Args, Default)]
pub struct JournalFields {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub venue: Option<String>,

    /// Stars, 0 to 5
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub rating: Option<u8>,

    #[arg(long)]
    pub content: Option<String>,
}
