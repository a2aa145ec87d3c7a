// ABOUTME: Main application orchestration for the extract-pause CLI
// ABOUTME: Coordinates between CLI arguments, configuration, the REST session and command execution

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use super::commands;
use super::{Args, Commands, Config};
use crate::client::{RestClient, TableauApi};
use crate::engine::{JsonFileSnapshotStore, PauseOptions, PauseOrchestrator, SnapshotStore};

pub struct App {
    config: Config,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        match self.config.logging.format.as_str() {
            "compact" => {
                tracing_subscriber::fmt()
                    .compact()
                    .with_env_filter(env_filter)
                    .with_ansi(!no_color)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .init();
            }
            _ => {
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(!no_color)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Run the application with parsed arguments
    pub async fn run(&mut self, args: Args) -> Result<()> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting extract-pause v{}", env!("CARGO_PKG_VERSION"));
        debug!("Configuration loaded from: {:?}", args.config);

        let store: Arc<dyn SnapshotStore> =
            Arc::new(JsonFileSnapshotStore::new(self.config.snapshot_file.clone()));

        // Listing the ledger needs no server session
        let command = match args.command {
            Commands::ListPaused { root_id } => {
                return commands::list_paused(store.as_ref(), root_id).await;
            }
            command => command,
        };

        let client = Arc::new(RestClient::new(self.config.connection_settings()?)?);
        client.sign_in().await?;

        let result = self.dispatch(command, Arc::clone(&client), store).await;

        if let Err(e) = client.sign_out().await {
            warn!("Sign-out failed: {}", e);
        }

        result
    }

    async fn dispatch(
        &self,
        command: Commands,
        client: Arc<RestClient>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<()> {
        let api: Arc<dyn TableauApi> = client;
        let orchestrator = PauseOrchestrator::new(Arc::clone(&api), store)
            .with_max_concurrent(self.config.max_concurrent_calls);

        match command {
            Commands::Pause {
                kind,
                selector,
                no_upstream,
                dry_run,
                output,
            } => {
                let options = PauseOptions {
                    include_upstream: self.config.include_upstream && !no_upstream,
                    dry_run,
                };
                commands::pause(&orchestrator, selector.entity_ref(kind)?, options, output).await
            }

            Commands::Resume {
                kind,
                selector,
                output,
            } => commands::resume(&orchestrator, selector.entity_ref(kind)?, output).await,

            Commands::Schedule { action, selector } => {
                let suspend = action == super::args::ScheduleAction::Suspend;
                commands::set_schedule(api, selector.schedule_ref()?, suspend)
                    .await
                    .map(|_| ())
            }

            Commands::Resolve {
                kind,
                selector,
                no_upstream,
            } => {
                let include_upstream = self.config.include_upstream && !no_upstream;
                commands::resolve(&orchestrator, selector.entity_ref(kind)?, include_upstream).await
            }

            Commands::ListPaused { root_id } => {
                commands::list_paused(orchestrator.store().as_ref(), root_id).await
            }
        }
    }

    /// Create application from parsed command line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}
