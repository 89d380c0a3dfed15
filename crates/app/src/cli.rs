use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[arg(long, default_value = "once")]
    pub mode: Mode,
    /// Source slug to harvest; repeat to harvest several. Overrides HARVEST_SOURCES.
    #[arg(long = "source", value_name = "SLUG")]
    pub sources: Vec<String>,
    /// Keep comments from this many days before today.
    #[arg(long)]
    pub days_back: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Harvest every source once and exit.
    Once,
    /// Harvest every day at HARVEST_RUN_AT.
    Daily,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Mode};

    #[test]
    fn defaults_to_a_single_run() {
        let cli = Cli::parse_from(["harvest"]);
        assert_eq!(cli.mode, Mode::Once);
        assert!(cli.sources.is_empty());
        assert_eq!(cli.days_back, None);
    }

    #[test]
    fn daily_mode_with_sources() {
        let cli = Cli::parse_from(["harvest", "--mode", "daily", "--source", "mts"]);
        assert_eq!(cli.mode, Mode::Daily);
        assert_eq!(cli.sources, vec!["mts".to_string()]);
    }
}
