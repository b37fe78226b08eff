pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "backbone",
    version,
    about = "Build a multi-provider taxonomic backbone and match names against it",
    long_about = "Backbone merges taxonomic exports from several data providers into one \
                  consistent tree, arbitrating homonyms, synonyms and conflicting placements, \
                  and resolves noisy scientific names and classifications against the result."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a backbone from provider exports
    Build(commands::build::BuildArgs),

    /// Match names or classifications against a built backbone
    Search(commands::search::SearchArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from([
            "backbone",
            "-vv",
            "build",
            "--providers",
            "providers.json",
            "--source",
            "apc=apc.csv",
            "--source",
            "ausfungi=fungi.tsv",
            "--output",
            "out",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.sources.len(), 2);
                assert_eq!(args.sources[1].provider, "ausfungi");
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "backbone", "search", "--index", "out", "--genus", "Simsia", "--kingdom", "Plantae", "-j", "4",
        ]);
        assert_eq!(cli.threads, 4);
        match cli.command {
            Commands::Search(args) => assert_eq!(args.genus.as_deref(), Some("Simsia")),
            _ => panic!("expected search"),
        }
    }
}
