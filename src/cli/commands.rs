use clap::{Parser, Subcommand};

/// `Tenax` - a conversational accountability agent.
#[derive(Parser, Debug)]
#[command(name = "tenax")]
#[command(version = "0.1.0")]
#[command(about = "Keeps you to your word: tasks, clarifications and P1 guardrails.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with the agent on stdin/stdout (tasks live in memory only)
    Chat {
        /// User id the conversation is recorded under
        #[arg(short, long, default_value = "local")]
        user: String,

        /// IANA timezone, e.g. Asia/Tokyo (default: config default_timezone)
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Classify one message and print the intent as JSON
    Classify {
        /// The message text
        text: String,

        /// IANA timezone used to resolve times in the message
        #[arg(long)]
        timezone: Option<String>,
    },
}
