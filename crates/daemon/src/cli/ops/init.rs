use clap::Args;

use common::prelude::{Recipients, DEFAULT_CONTAINER_SUFFIX};
use passd_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Key id of a root recipient (repeatable)
    #[arg(long = "recipient", required = true)]
    pub recipients: Vec<String>,

    /// API server port
    #[arg(long, default_value_t = 5001)]
    pub api_port: u16,

    /// File suffix that marks encrypted secrets
    #[arg(long, default_value = DEFAULT_CONTAINER_SUFFIX)]
    pub suffix: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(#[from] common::prelude::RecipientError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            api_port: self.api_port,
            root_recipients: Recipients::parse(&self.recipients)?,
            container_suffix: self.suffix.clone(),
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), config)?;

        let output = format!(
            "Initialized passd directory at: {}\n\
             - Database: {}\n\
             - Logs: {}\n\
             - Config: {}\n\
             - API port: {}\n\
             - Root recipients: {}",
            state.passd_dir.display(),
            state.db_path.display(),
            state.logs_path.display(),
            state.config_path.display(),
            state.config.api_port,
            state.config.root_recipients,
        );

        Ok(output)
    }
}
