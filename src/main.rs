use clap::{Parser, Subcommand};
use maplebond::Result;
use maplebond::commands::{backfill, create_index, drop_index, search, serve};
use maplebond::config::Config;
use maplebond::rag::DEFAULT_SEARCH_RESULTS;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "maplebond")]
#[command(about = "RAG chat backend over a vector-indexed document store")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "maplebond.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server
    Serve,
    /// Populate contentVector on every document from a source field
    Backfill {
        /// Document field to embed
        field: String,
    },
    /// Create the vector search index
    CreateIndex,
    /// Drop the vector search index
    DropIndex,
    /// Run a similarity search and print the results
    Search {
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = DEFAULT_SEARCH_RESULTS)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            serve(config).await?;
        }
        Commands::Backfill { field } => {
            backfill(config, field).await?;
        }
        Commands::CreateIndex => {
            create_index(config).await?;
        }
        Commands::DropIndex => {
            drop_index(config).await?;
        }
        Commands::Search { query, limit } => {
            search(config, query, limit).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["maplebond", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Serve));
        }
    }

    #[test]
    fn backfill_command_with_field() {
        let cli = Cli::try_parse_from(["maplebond", "backfill", "desc"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Backfill { field } = parsed.command {
                assert_eq!(field, "desc");
            }
        }
    }

    #[test]
    fn search_command_with_limit() {
        let cli = Cli::try_parse_from(["maplebond", "search", "study permits", "--limit", "5"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, limit } = parsed.command {
                assert_eq!(query, "study permits");
                assert_eq!(limit, 5);
            }
        }
    }

    #[test]
    fn search_limit_defaults_to_three() {
        let cli = Cli::try_parse_from(["maplebond", "search", "study permits"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { limit, .. } = parsed.command {
                assert_eq!(limit, 3);
            }
        }
    }

    #[test]
    fn config_path_flag() {
        let cli = Cli::try_parse_from(["maplebond", "--config", "/tmp/other.toml", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config, PathBuf::from("/tmp/other.toml"));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["maplebond", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["maplebond", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
