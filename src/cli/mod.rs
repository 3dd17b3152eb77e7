use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "noq-request",
    about = "Create self-service change requests against the Noq API"
)]
pub struct Cli {
    /// Log at debug level (written to the log file next to the session store).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the request wizard (default).
    New,
    /// List the configured provider integrations.
    Providers,
    /// Look up resource suggestions for a template field.
    Search(SearchArgs),
    /// Store an access token for the Noq API.
    Auth(AuthArgs),
    /// Show or change client settings.
    Config(ConfigArgs),
    /// Inspect or clear the local session store.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Provider name (e.g., "aws").
    pub provider: String,
    /// Template id under the provider (e.g., "s3").
    pub template_id: String,
    /// Field to complete.
    pub field: String,
    /// Prefix typed so far.
    pub prefix: String,
}

#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Also prompt for a CSRF token.
    #[arg(long)]
    pub csrf: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the effective settings.
    #[arg(long)]
    pub show: bool,
    /// Base URL of the Noq API.
    #[arg(long)]
    pub api_url: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List stored session entries.
    Show,
    /// Remove all stored session entries.
    Clear,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_wizard() {
        let cli = Cli::try_parse_from(["noq-request"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["noq-request", "providers", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Providers)));
    }

    #[test]
    fn search_takes_four_positionals() {
        let cli = Cli::try_parse_from(["noq-request", "search", "aws", "s3", "bucket_name", "lo"])
            .unwrap();
        let Some(Commands::Search(args)) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.field, "bucket_name");
        assert_eq!(args.prefix, "lo");

        assert!(Cli::try_parse_from(["noq-request", "search", "aws"]).is_err());
    }

    #[test]
    fn config_flags() {
        let cli = Cli::try_parse_from([
            "noq-request",
            "config",
            "--api-url",
            "https://noq.example.com",
            "--timeout",
            "20",
        ])
        .unwrap();
        let Some(Commands::Config(args)) = cli.command else {
            panic!("expected config");
        };
        assert!(!args.show);
        assert_eq!(args.api_url.as_deref(), Some("https://noq.example.com"));
        assert_eq!(args.timeout, Some(20));
    }
}
