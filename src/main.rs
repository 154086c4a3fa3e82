//! CLI entry point for skiff.

mod cli;

use clap::Parser;
use skiff::config::{
    ensure_default_global_config, initialize_default_global_config, load_config, Config,
    GlobalConfigInitResult,
};
use skiff::instance::{Ec2CliDirectory, InstanceDirectory};
use skiff::session::{ExecutionRequest, Session, SessionOptions};
use skiff::transport::TerminalGeometry;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = ensure_default_global_config() {
        eprintln!("warning: failed to initialize ~/.config/skiff/skiff.toml: {e}");
    }

    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let outcome = match args.command {
        cli::CliCommand::Run {
            instance_id,
            command,
            region,
            user,
            key,
            screen,
            detach,
            no_terminate,
            timeout,
            pty,
        } => {
            run_command(RunParams {
                config,
                instance_id,
                command: command.join(" "),
                region,
                user,
                key,
                screen,
                detach,
                terminate: !no_terminate,
                timeout: timeout.map(Duration::from_secs),
                pty,
            })
            .await
        }
        cli::CliCommand::Status {
            instance_id,
            region,
        } => status_command(&config, &instance_id, region.as_deref()).await,
        cli::CliCommand::Init { force } => init_command(force),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "skiff=debug" } else { "skiff=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct RunParams {
    config: Config,
    instance_id: String,
    command: String,
    region: Option<String>,
    user: Option<String>,
    key: Option<String>,
    screen: bool,
    detach: bool,
    terminate: bool,
    timeout: Option<Duration>,
    pty: bool,
}

async fn run_command(params: RunParams) -> Result<(), Box<dyn std::error::Error>> {
    let region = params
        .region
        .unwrap_or_else(|| params.config.aws.region.clone());
    let options = SessionOptions {
        user: params.user.unwrap_or_else(|| params.config.ssh.user.clone()),
        private_key: params
            .key
            .or_else(|| params.config.ssh.private_key.clone())
            .map(PathBuf::from),
        geometry: local_geometry(),
    };

    let session = Session::open(&Ec2CliDirectory, &params.instance_id, &region, options).await?;

    if params.screen {
        // Output is mirrored to stdout live while polling; nothing to reprint.
        session
            .run_in_screen(&params.command, false, params.terminate, params.timeout)
            .await?;
        return Ok(());
    }

    let mut request = ExecutionRequest::new(params.command);
    request.timeout = params.timeout;
    request.use_pty = params.pty;
    request.detach = params.detach;
    request.terminate = params.terminate;

    let output = session.run(&request).await?;
    if params.detach {
        // The reattach hint was already logged; the startup output is all
        // there is to show.
        print!("{}", output.stdout);
        std::io::stdout().flush()?;
        return Ok(());
    }

    print!("{}", output.stdout);
    std::io::stdout().flush()?;
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
    Ok(())
}

async fn status_command(
    config: &Config,
    instance_id: &str,
    region: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let region = region.unwrap_or(&config.aws.region);
    let instance = Ec2CliDirectory.describe(instance_id, region).await?;
    println!(
        "{}  {}  {}",
        instance.instance_id,
        instance.state,
        instance.public_ip.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn init_command(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    match initialize_default_global_config(force)? {
        GlobalConfigInitResult::Created { path } => {
            println!("created {}", path.display());
        }
        GlobalConfigInitResult::AlreadyInitialized { path } => {
            println!(
                "{} already exists; pass --force to overwrite",
                path.display()
            );
        }
        GlobalConfigInitResult::Overwritten { path, backup_path } => {
            println!(
                "overwrote {} (previous config saved to {})",
                path.display(),
                backup_path.display()
            );
        }
    }
    Ok(())
}

/// Size the remote pty like the local terminal; fall back to 80x24 when
/// stdout is not a terminal.
fn local_geometry() -> TerminalGeometry {
    match crossterm::terminal::size() {
        Ok((columns, rows)) if columns > 0 && rows > 0 => TerminalGeometry { columns, rows },
        _ => TerminalGeometry::default(),
    }
}
