//! Sanad CLI
//!
//! Command-line interface for Sanad - anonymous chat and a problem board.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use sanad_core::{gateway, Config, Gateway, ReportReason};

mod chat;
mod commands;
mod logging;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "sanad")]
#[command(about = "Sanad - anonymous chat and peer support")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live chat (opens the chat screen when no subcommand is given)
    Chat {
        #[command(subcommand)]
        command: Option<ChatCommands>,
    },
    /// Post, browse and discuss problems
    Problem {
        #[command(subcommand)]
        command: ProblemCommands,
    },
    /// Act on comments
    Comment {
        #[command(subcommand)]
        command: CommentCommands,
    },
    /// Moderate reported content
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Show a random wellbeing tip
    Tip,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Send one message
    Send {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Print recent messages
    Show,
    /// Print recent messages and follow new ones
    Watch,
}

#[derive(Subcommand)]
enum ProblemCommands {
    /// Post a new problem
    #[command(alias = "post")]
    Add {
        /// Short title
        title: String,
        /// What is going on
        description: String,
    },
    /// List problems, newest first
    #[command(alias = "ls")]
    List {
        /// Only problems whose title or description contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show a problem and its comments
    Show {
        /// Problem ID (full or prefix)
        id: String,
    },
    /// Comment on a problem
    Comment {
        /// Problem ID (full or prefix)
        problem_id: String,
        /// Comment text
        text: String,
    },
    /// Vote on a comment
    Vote {
        /// Comment ID (full or prefix)
        comment_id: String,
        /// Whether the comment helped
        #[arg(value_enum)]
        verdict: Verdict,
    },
    /// Report a problem to moderators
    Report {
        /// Problem ID (full or prefix)
        id: String,
        /// inappropriate, misleading, copyright, abusive or other
        #[arg(short, long, default_value = "other")]
        reason: ReportReason,
    },
}

#[derive(Subcommand)]
enum CommentCommands {
    /// Report a comment to moderators
    Report {
        /// Comment ID (full or prefix)
        id: String,
        /// inappropriate, misleading, copyright, abusive or other
        #[arg(short, long, default_value = "other")]
        reason: ReportReason,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List open reports
    Reports,
    /// Delete a problem with its comments and reports
    DeleteProblem {
        /// Problem ID (full or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete a comment and its reports
    DeleteComment {
        /// Comment ID (full or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Close a report without deleting anything
    Dismiss {
        /// Report ID (full or prefix)
        id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (backend, data_dir, api_url, api_key, realtime_url, page_size, log_file)
        key: String,
        /// Configuration value ("none" clears optional keys)
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Verdict {
    Helpful,
    Unhelpful,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Commands that don't need a backend
    match &cli.command {
        Commands::Config { command } => {
            return handle_config_command(command.clone(), config_path, &output);
        }
        Commands::Tip => {
            commands::tip::show(&output);
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load_with_cli_override(config_path)?;

    let interactive = matches!(&cli.command, Commands::Chat { command: None });
    if !interactive {
        logging::init_stderr();
    }

    let gateway = gateway::connect(&config)?;

    match cli.command {
        Commands::Chat { command: None } => chat::run(&config, gateway).await,
        Commands::Chat {
            command: Some(command),
        } => handle_chat_command(command, gateway, &config, &output).await,
        Commands::Problem { command } => {
            handle_problem_command(command, gateway, &config, &output).await
        }
        Commands::Comment {
            command: CommentCommands::Report { id, reason },
        } => commands::problem::report_comment(gateway, &config, id, reason, &output).await,
        Commands::Admin { command } => handle_admin_command(command, gateway, &output).await,
        Commands::Tip | Commands::Config { .. } => Ok(()), // Handled above
    }
}

async fn handle_chat_command(
    command: ChatCommands,
    gateway: Arc<dyn Gateway>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        ChatCommands::Send { text } => {
            commands::chat::send(gateway, config, text.join(" "), output).await
        }
        ChatCommands::Show => commands::chat::show(gateway, config, output).await,
        ChatCommands::Watch => commands::chat::watch(gateway, config, output).await,
    }
}

async fn handle_problem_command(
    command: ProblemCommands,
    gateway: Arc<dyn Gateway>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        ProblemCommands::Add { title, description } => {
            commands::problem::add(gateway, config, title, description, output).await
        }
        ProblemCommands::List { search } => {
            commands::problem::list(gateway, config, search, output).await
        }
        ProblemCommands::Show { id } => commands::problem::show(gateway, config, id, output).await,
        ProblemCommands::Comment { problem_id, text } => {
            commands::problem::comment(gateway, config, problem_id, text, output).await
        }
        ProblemCommands::Vote {
            comment_id,
            verdict,
        } => {
            let helpful = matches!(verdict, Verdict::Helpful);
            commands::problem::vote(gateway, config, comment_id, helpful, output).await
        }
        ProblemCommands::Report { id, reason } => {
            commands::problem::report_problem(gateway, config, id, reason, output).await
        }
    }
}

async fn handle_admin_command(
    command: AdminCommands,
    gateway: Arc<dyn Gateway>,
    output: &Output,
) -> Result<()> {
    match command {
        AdminCommands::Reports => commands::admin::reports(gateway, output).await,
        AdminCommands::DeleteProblem { id, yes } => {
            commands::admin::delete_problem(gateway, id, yes, output).await
        }
        AdminCommands::DeleteComment { id, yes } => {
            commands::admin::delete_comment(gateway, id, yes, output).await
        }
        AdminCommands::Dismiss { id } => commands::admin::dismiss(gateway, id, output).await,
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
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
    fn test_parse_report_reason() {
        let cli = Cli::try_parse_from(["sanad", "problem", "report", "abc", "--reason", "abusive"])
            .unwrap();
        match cli.command {
            Commands::Problem {
                command: ProblemCommands::Report { id, reason },
            } => {
                assert_eq!(id, "abc");
                assert_eq!(reason, ReportReason::Abusive);
            }
            _ => panic!("expected problem report"),
        }

        let cli = Cli::try_parse_from(["sanad", "comment", "report", "c1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Comment {
                command: CommentCommands::Report {
                    reason: ReportReason::Other,
                    ..
                }
            }
        ));

        assert!(Cli::try_parse_from(["sanad", "problem", "report", "abc", "-r", "spam"]).is_err());
    }

    #[test]
    fn test_chat_send_joins_words() {
        let cli = Cli::try_parse_from(["sanad", "chat", "send", "hello", "there"]).unwrap();
        match cli.command {
            Commands::Chat {
                command: Some(ChatCommands::Send { text }),
            } => assert_eq!(text.join(" "), "hello there"),
            _ => panic!("expected chat send"),
        }

        let cli = Cli::try_parse_from(["sanad", "chat"]).unwrap();
        assert!(matches!(cli.command, Commands::Chat { command: None }));
    }
}
