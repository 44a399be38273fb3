//! CLI argument structures

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::shop::Item;

/// Inspect and drive a learner's progress, resources and achievements
#[derive(Parser, Debug)]
#[command(name = "kvantor")]
#[command(about = "kvantor - learner progress and resource economy", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Learner to act on
    #[arg(short = 'u', long, global = true, default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a learner with starting resources and base achievements
    Bootstrap {
        #[arg(long)]
        nickname: String,

        #[arg(long, default_value = "default")]
        avatar: String,
    },

    /// Show resources, progress and the regeneration countdown
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer the current page of a course
    Answer {
        #[arg(long)]
        course: String,

        /// Chosen answer index for a test page
        #[arg(long, conflicts_with = "code")]
        choice: Option<usize>,

        /// Submitted code for a coding page
        #[arg(long)]
        code: Option<String>,
    },

    /// Spend a hint on the current page of a course
    Hint {
        #[arg(long)]
        course: String,
    },

    /// Buy a life or a hint with coins
    Buy {
        #[arg(value_enum)]
        item: ShopItem,
    },

    /// Move to the next page of a course
    Next {
        #[arg(long)]
        course: String,
    },

    /// Run the life regeneration loop
    Regen {
        /// Stop after this many checks (runs until Ctrl-C otherwise)
        #[arg(long)]
        ticks: Option<u32>,
    },

    /// List the learner's achievements
    Achievements,

    /// Ask the review assistant about code or a free-form question
    Review {
        /// Task the code was written for
        #[arg(long, requires = "code")]
        task: Option<String>,

        /// Code to review
        #[arg(long, requires = "task")]
        code: Option<String>,

        /// Free-form question
        #[arg(long, conflicts_with_all = ["task", "code"])]
        ask: Option<String>,

        /// Chat with the assistant, one question per line on stdin
        #[arg(long, conflicts_with_all = ["task", "code", "ask"])]
        chat: bool,
    },

    /// Load a course's modules from a JSON file
    ImportCourse {
        course: String,

        /// JSON array of module documents
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShopItem {
    Life,
    Hint,
}

impl From<ShopItem> for Item {
    fn from(item: ShopItem) -> Self {
        match item {
            ShopItem::Life => Item::Life,
            ShopItem::Hint => Item::Hint,
        }
    }
}
