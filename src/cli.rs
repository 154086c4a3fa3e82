//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Run commands on EC2 instances over SSH, with detachable screen sessions.
#[derive(Debug, Parser)]
#[command(name = "skiff", version)]
pub struct Args {
    /// Path to config file (default: ./skiff.toml or ~/.config/skiff/skiff.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Enable debug logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a command on an instance.
    Run {
        /// Target instance id (e.g. i-0abc123).
        instance_id: String,

        /// Command to run, passed verbatim to the remote shell.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,

        /// Override the configured AWS region.
        #[arg(long = "region")]
        region: Option<String>,

        /// Override the configured ssh login user.
        #[arg(short = 'u', long = "user")]
        user: Option<String>,

        /// Override the configured private key path.
        #[arg(short = 'i', long = "key")]
        key: Option<String>,

        /// Run inside a screen session and wait for completion.
        #[arg(long = "screen", conflicts_with = "detach")]
        screen: bool,

        /// Run inside a screen session and detach once started.
        #[arg(short = 'd', long = "detach")]
        detach: bool,

        /// Leave the screen session alive after the command completes.
        #[arg(long = "no-terminate")]
        no_terminate: bool,

        /// Give up waiting after this many seconds (detached runs default to 600).
        #[arg(short = 't', long = "timeout", value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Allocate a pty for a plain (non-screen) run.
        #[arg(long = "pty")]
        pty: bool,
    },

    /// Show an instance's state and public address.
    Status {
        /// Target instance id.
        instance_id: String,

        /// Override the configured AWS region.
        #[arg(long = "region")]
        region: Option<String>,
    },

    /// Write the default config file to ~/.config/skiff/skiff.toml.
    Init {
        /// Overwrite an existing config file (the old one is backed up).
        #[arg(long = "force")]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_args(args: Args) -> (String, Vec<String>, bool, bool) {
        match args.command {
            CliCommand::Run {
                instance_id,
                command,
                detach,
                screen,
                ..
            } => (instance_id, command, detach, screen),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_collects_trailing_command_words() {
        let args = Args::parse_from(["skiff", "run", "i-0abc123", "ls", "-la", "/tmp"]);
        let (instance_id, command, detach, _) = run_args(args);
        assert_eq!(instance_id, "i-0abc123");
        assert_eq!(command, vec!["ls", "-la", "/tmp"]);
        assert!(!detach);
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Args::try_parse_from(["skiff", "run", "i-0abc123"]).is_err());
    }

    #[test]
    fn detach_and_screen_conflict() {
        assert!(
            Args::try_parse_from(["skiff", "run", "i-0abc123", "--detach", "--screen", "true"])
                .is_err()
        );
    }

    #[test]
    fn detach_flag_parses() {
        let args = Args::parse_from(["skiff", "run", "-d", "i-0abc123", "make", "train"]);
        let (_, command, detach, screen) = run_args(args);
        assert!(detach);
        assert!(!screen);
        assert_eq!(command, vec!["make", "train"]);
    }

    #[test]
    fn run_overrides_parse() {
        let args = Args::parse_from([
            "skiff",
            "run",
            "--region",
            "eu-west-1",
            "-u",
            "ubuntu",
            "-i",
            "/tmp/key.pem",
            "-t",
            "30",
            "i-0abc123",
            "uptime",
        ]);
        match args.command {
            CliCommand::Run {
                region,
                user,
                key,
                timeout,
                ..
            } => {
                assert_eq!(region.as_deref(), Some("eu-west-1"));
                assert_eq!(user.as_deref(), Some("ubuntu"));
                assert_eq!(key.as_deref(), Some("/tmp/key.pem"));
                assert_eq!(timeout, Some(30));
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn status_parses() {
        let args = Args::parse_from(["skiff", "status", "i-0abc123", "--region", "us-west-2"]);
        match args.command {
            CliCommand::Status {
                instance_id,
                region,
            } => {
                assert_eq!(instance_id, "i-0abc123");
                assert_eq!(region.as_deref(), Some("us-west-2"));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let args = Args::parse_from(["skiff", "status", "i-0abc123", "-c", "custom.toml", "-v"]);
        assert_eq!(args.config.as_deref(), Some("custom.toml"));
        assert!(args.verbose);
    }

    #[test]
    fn init_parses_force() {
        let args = Args::parse_from(["skiff", "init", "--force"]);
        assert!(matches!(args.command, CliCommand::Init { force: true }));
    }
}
