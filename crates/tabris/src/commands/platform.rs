//! `tabris platform` command implementation.

use std::path::PathBuf;

use clap::Args;
use console::Term;
use tabris_config::{CliSettings, Config};
use tabris_platform::{
    DownloadProgress, Platform, PlatformProvider, PlatformSource, installed_version,
    validate_installed_version,
};

use crate::error::CliError;
use crate::output::Output;
use crate::prompt::TerminalPrompt;

/// Arguments for the platform command.
#[derive(Args)]
pub(crate) struct PlatformArgs {
    /// Platform name (e.g. android, ios).
    name: String,

    /// Platform version.
    version: String,

    /// App directory whose installed tabris version must match.
    #[arg(long)]
    app: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover tabris.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding downloaded platforms (overrides config).
    #[arg(long, env = "TABRIS_CLI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl PlatformArgs {
    /// Execute the platform command.
    ///
    /// Prints the resolved platform directory on stdout.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        if let Some(app) = &self.app {
            let actual = installed_version(app)?;
            validate_installed_version(&actual, &self.version)?;
        }

        let cli_settings = CliSettings {
            data_dir: self.data_dir,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let progress_output = output.clone();
        let provider = PlatformProvider::new(
            &config.platforms_resolved,
            Box::new(TerminalPrompt::new()),
        )
        .with_progress(move |progress| progress_output.progress(&progress_line(progress)));

        let platform = Platform::new(self.name, self.version);
        let resolved = provider.get_platform(&platform)?;
        match resolved.source {
            PlatformSource::Fetched => {
                output.end_progress();
                output.success(&format!(
                    "Downloaded {} {}",
                    platform.name, platform.version
                ));
            }
            PlatformSource::Override => {
                output.info(&format!("Using {}", platform.override_var()));
            }
            PlatformSource::Cached => {}
        }

        Term::stdout().write_line(&resolved.path.display().to_string())?;
        Ok(())
    }
}

fn progress_line(progress: &DownloadProgress) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    #[allow(clippy::cast_precision_loss)]
    let current = progress.current as f64 / MIB;
    match progress.total {
        Some(total) if total > 0 => {
            #[allow(clippy::cast_precision_loss)]
            let total_mib = total as f64 / MIB;
            let percent = progress.current.saturating_mul(100) / total;
            format!("Downloading platform: {current:.1} / {total_mib:.1} MiB ({percent}%)")
        }
        _ => format!("Downloading platform: {current:.1} MiB"),
    }
}
