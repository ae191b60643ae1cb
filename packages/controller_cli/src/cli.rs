use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sunshine-controller")]
pub struct Cli {
    /// Controller config in toml, yaml or json
    #[arg(long)]
    pub config: Option<String>,
    /// Persisted plugin settings (lastAuthHeader, lastRunState)
    #[arg(long)]
    pub settings_path: Option<String>,
    #[arg(long)]
    pub log_path: Option<String>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Clone, Subcommand)]
pub enum CliCommand {
    #[command(name = "version")]
    Version,
    /// Provision dependencies, restore credentials and start if it was running last time
    #[command(name = "run")]
    Run,
    #[command(name = "start")]
    Start,
    #[command(name = "stop")]
    Stop,
    #[command(name = "status")]
    Status,
    #[command(name = "pair")]
    Pair {
        pin: String,
        client_name: String,
    },
    #[command(name = "set-credentials")]
    SetCredentials {
        username: String,
        password: String,
    },
    #[command(name = "change-credentials")]
    ChangeCredentials {
        username: String,
        password: String,
    },
    #[command(name = "get-credentials")]
    GetCredentials,
    #[command(name = "credentials-valid")]
    CredentialsValid,
    #[command(name = "ensure-dependencies")]
    EnsureDependencies,
    #[command(name = "update")]
    Update,
    #[command(name = "version-info")]
    VersionInfo,
    /// Log state transitions until interrupted
    #[command(name = "monitor")]
    Monitor {
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_global_flags_and_pair() {
        let cli = Cli::try_parse_from([
            "sunshine-controller",
            "--settings-path",
            "/tmp/settings.json",
            "pair",
            "1234",
            "Steam Deck",
        ])
        .unwrap();

        assert_eq!(cli.settings_path.as_deref(), Some("/tmp/settings.json"));
        match cli.command {
            CliCommand::Pair { pin, client_name } => {
                assert_eq!(pin, "1234");
                assert_eq!(client_name, "Steam Deck");
            }
            _ => panic!("expected pair"),
        }
    }

    #[test]
    fn monitor_interval_defaults() {
        let cli = Cli::try_parse_from(["sunshine-controller", "monitor"]).unwrap();
        assert!(matches!(cli.command, CliCommand::Monitor { interval: 5 }));

        let cli = Cli::try_parse_from(["sunshine-controller", "monitor", "--interval", "30"]).unwrap();
        assert!(matches!(cli.command, CliCommand::Monitor { interval: 30 }));
    }

    #[test]
    fn set_credentials_requires_both_values() {
        assert!(Cli::try_parse_from(["sunshine-controller", "set-credentials", "deck"]).is_err());
        assert!(Cli::try_parse_from(["sunshine-controller"]).is_err());
    }
}
