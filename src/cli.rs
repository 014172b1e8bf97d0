use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}

/// Command-line arguments for the demo watcher.
#[derive(Debug, Parser)]
#[command(name = "fraudlens", about = "Watch live fraud-analytics feeds")]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,

    /// Also watch the credential-gated alerts feed
    #[arg(long)]
    pub alerts: bool,
}
