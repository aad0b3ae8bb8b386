use clap::Args;

use common::prelude::SecretPath;
use passd_daemon::http_server::api::client::ApiError;
use passd_daemon::http_server::api::v0::perm::PermRequest;

#[derive(Args, Debug, Clone)]
pub struct Perm {
    /// Directory to inspect
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PermError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Perm {
    type Error = PermError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let request = PermRequest {
            path: SecretPath::new(&self.path),
        };
        let response = ctx.client.call(request).await?;

        let explicit = if response.explicit.is_empty() {
            "(inherited)".to_string()
        } else {
            response.explicit.to_string()
        };
        let mut lines = vec![
            format!("path:     {}", response.path),
            format!("access:   {}", response.access),
            format!("explicit: {}", explicit),
            format!("a change here re-encrypts {} secret(s):", response.change.len()),
        ];
        lines.extend(response.change.iter().map(|p| format!("  {}", p)));

        Ok(lines.join("\n"))
    }
}
