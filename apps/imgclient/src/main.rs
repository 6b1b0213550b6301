//! SCDFTH command-line client.
//!
//! ```text
//! scdft-imgclient <host> <port> put <src> <dest> [--folder] [--break-on-error]
//! scdft-imgclient <host> <port> get <remote> [--file <dir>] [--thumbnail]
//! scdft-imgclient <host> <port> del <remote>
//! ```
//!
//! Logs and the final `status: ok` / `status: ko` line go to stderr so a GET
//! streamed to stdout stays clean.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scdft_client::{Client, ClientConfig, Outcome, OutputMode, TransferOrchestrator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    host: String,

    /// Server port
    port: u16,

    /// Connect/read timeout in milliseconds (0 disables it)
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, or every file of a folder
    Put {
        /// Local file (or folder with --folder)
        src: PathBuf,

        /// Server path of the file (or destination folder with --folder)
        dest: String,

        /// Upload every file directly inside `src`
        #[arg(short, long)]
        folder: bool,

        /// Stop a folder upload at the first failed file
        #[arg(short, long, requires = "folder")]
        break_on_error: bool,
    },
    /// Download a file to stdout or into a directory
    Get {
        /// Server path of the file
        remote: String,

        /// Save into this directory instead of writing to stdout
        #[arg(long, value_name = "DIR")]
        file: Option<PathBuf>,

        /// Request the file's thumbnail
        #[arg(short = 'T', long)]
        thumbnail: bool,
    },
    /// Delete a file on the server
    Del {
        /// Server path of the file
        remote: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(run(cli)),
        Err(e) => Outcome::failed(format!("could not start runtime: {e}")),
    };

    if outcome.success {
        eprintln!("status: ok");
        ExitCode::SUCCESS
    } else {
        eprintln!("{}", outcome.message);
        eprintln!("status: ko");
        ExitCode::FAILURE
    }
}

async fn run(cli: Cli) -> Outcome {
    let timeout = (cli.timeout_ms > 0).then(|| Duration::from_millis(cli.timeout_ms));
    let client = Arc::new(Client::new(
        ClientConfig::new(cli.host, cli.port).with_timeout(timeout),
    ));

    match cli.command {
        Commands::Put {
            src,
            dest,
            folder: true,
            break_on_error,
        } => {
            let orchestrator = TransferOrchestrator::new(client);
            match orchestrator.send_folder(&src, &dest, break_on_error).await {
                Ok(report) if report.success() => Outcome::ok(report.message()),
                Ok(report) => Outcome::failed(report.message()),
                Err(e) => Outcome::failed(e.to_string()),
            }
        }
        Commands::Put { src, dest, .. } => Outcome::from(&client.send_file(&src, &dest).await),
        Commands::Get {
            remote,
            file,
            thumbnail,
        } => {
            let mode = match file {
                Some(dir) if thumbnail => OutputMode::ToThumbnailFile(dir),
                Some(dir) => OutputMode::ToFile(dir),
                None => OutputMode::ToStdout,
            };
            let result = client.request_file(&remote, thumbnail, mode).await;
            if let Ok(download) = &result {
                if let Some(path) = &download.saved_to {
                    tracing::info!(path = %path.display(), bytes = download.len(), "saved");
                }
            }
            Outcome::from(&result)
        }
        Commands::Del { remote } => Outcome::from(&client.delete_file(&remote).await),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_folder_put() {
        let cli = Cli::parse_from([
            "scdft-imgclient",
            "localhost",
            "12345",
            "put",
            "./shots",
            "/img",
            "--folder",
            "--break-on-error",
        ]);
        assert_eq!(cli.port, 12345);
        match cli.command {
            Commands::Put {
                folder,
                break_on_error,
                dest,
                ..
            } => {
                assert!(folder);
                assert!(break_on_error);
                assert_eq!(dest, "/img");
            }
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn parses_thumbnail_get() {
        let cli = Cli::parse_from(["scdft-imgclient", "h", "1", "get", "/a.png", "--file", "out", "-T"]);
        match cli.command {
            Commands::Get { file, thumbnail, .. } => {
                assert!(thumbnail);
                assert_eq!(file, Some(PathBuf::from("out")));
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn break_on_error_requires_folder() {
        let result = Cli::try_parse_from(["scdft-imgclient", "h", "1", "put", "a", "/a", "--break-on-error"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_source_is_ko() {
        let cli = Cli::parse_from(["scdft-imgclient", "127.0.0.1", "1", "put", "/definitely/not/here.png", "/a.png"]);
        let outcome = run(cli).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("file not found"));
    }
}
