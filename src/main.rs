use std::path::PathBuf;

use clap::{Parser, Subcommand};
use smartfix::Result;
use smartfix::commands::{ask, build_index, chat, show_status};
use smartfix::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "smartfix")]
#[command(about = "Offline retrieval-augmented troubleshooting assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure embedding, generation, and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the vector index from a knowledge base file
    Build {
        /// Path to the knowledge base JSON file
        corpus: PathBuf,
        /// Where to write the index (defaults to the configured location)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Ask a single troubleshooting question
    Ask {
        /// The question to answer
        query: String,
        /// Restrict results to a device category, e.g. "router"
        #[arg(long)]
        device: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start an interactive troubleshooting session
    Chat,
    /// Show status of the index, embedding backend, and generative model
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Build { corpus, output } => {
            build_index(corpus, output).await?;
        }
        Commands::Ask {
            query,
            device,
            json,
        } => {
            ask(query, device, json).await?;
        }
        Commands::Chat => {
            chat().await?;
        }
        Commands::Status => {
            show_status()?;
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
        let cli = Cli::try_parse_from(["smartfix", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn build_command_with_corpus() {
        let cli = Cli::try_parse_from(["smartfix", "build", "corpus.json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Build { corpus, output } = parsed.command {
                assert_eq!(corpus, PathBuf::from("corpus.json"));
                assert_eq!(output, None);
            }
        }
    }

    #[test]
    fn ask_command_with_device_filter() {
        let cli = Cli::try_parse_from([
            "smartfix",
            "ask",
            "wifi keeps dropping",
            "--device",
            "router",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                query,
                device,
                json,
            } = parsed.command
            {
                assert_eq!(query, "wifi keeps dropping");
                assert_eq!(device, Some("router".to_string()));
                assert!(!json);
            }
        }
    }

    #[test]
    fn ask_command_json_flag() {
        let cli = Cli::try_parse_from(["smartfix", "ask", "wifi down", "--json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { json, .. } = parsed.command {
                assert!(json);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["smartfix", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn ask_requires_a_query() {
        let cli = Cli::try_parse_from(["smartfix", "ask"]);
        assert!(cli.is_err());
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["smartfix", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["smartfix", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
