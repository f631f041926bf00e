//! `tabris serve` command implementation.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use console::Term;
use tabris_config::{CliSettings, Config};
use tabris_server::{DevServer, ServerOptions, shutdown_signal};
use tabris_session::CommandSender;

use crate::console::{ConsoleExit, RemoteConsole, print_events};
use crate::error::CliError;
use crate::history::{HISTORY_FILE, History};
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// App directory containing package.json.
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Path to configuration file (default: auto-discover tabris.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable reloading the app when a served file changes.
    #[arg(long)]
    no_live_reload: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        validate_project(&self.project)?;

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            live_reload_enabled: self.no_live_reload.then_some(false),
            data_dir: None,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let server = DevServer::bind(ServerOptions::from_config(&config, &self.project)).await?;

        output.info(&format!(
            "Server started on http://{}",
            server.external_authority()?
        ));
        output.highlight(&format!("Debug URL: {}", server.debug_url()?));
        if server.watcher().is_some() {
            output.info("Live reload: enabled");
        } else {
            output.info("Live reload: disabled");
        }
        output.info("Type a command and press enter to evaluate it on the device, or 'exit' to quit.");

        let events = tokio::spawn(print_events(
            output.clone(),
            server.sessions().subscribe(),
            server.watcher().map(|watcher| watcher.subscribe()),
        ));

        let sender: Arc<dyn CommandSender> = Arc::new(server.sessions().clone());
        let mut console = RemoteConsole::new(sender, output.clone())
            .with_responses(server.sessions().subscribe());
        let history_path = config.platforms_resolved.data_dir.join(HISTORY_FILE);
        let quit = async move {
            let term = Term::stdout();
            let exit = if io::stdin().is_terminal() && term.is_term() {
                let history = History::load(&history_path).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Failed to load console history");
                    History::default()
                });
                console.run_interactive(term, history).await
            } else {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                console.run(stdin).await
            };
            match exit {
                Ok(ConsoleExit::Quit) => {}
                // Keep serving without a console
                Ok(ConsoleExit::EndOfInput) => std::future::pending().await,
                Err(e) => {
                    tracing::warn!(error = %e, "Remote console stopped");
                    std::future::pending::<()>().await;
                }
            }
        };

        server
            .run(async move {
                tokio::select! {
                    () = shutdown_signal() => {}
                    () = quit => {}
                }
            })
            .await?;

        events.abort();
        Ok(())
    }
}

/// Check that `project` is an app directory.
fn validate_project(project: &Path) -> Result<(), CliError> {
    if !project.is_dir() {
        return Err(CliError::Validation("Project must be a directory".to_owned()));
    }
    if !project.join("package.json").is_file() {
        return Err(CliError::Validation(
            "Project must contain package.json".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_validate_project_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.js");
        fs::write(&file, "").unwrap();

        let err = validate_project(&file).unwrap_err();
        assert_eq!(err.to_string(), "Project must be a directory");
    }

    #[test]
    fn test_validate_project_requires_package_json() {
        let dir = tempfile::tempdir().unwrap();

        let err = validate_project(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Project must contain package.json");

        fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert!(validate_project(dir.path()).is_ok());
    }
}
