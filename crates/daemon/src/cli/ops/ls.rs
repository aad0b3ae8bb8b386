use clap::Args;

use common::prelude::SecretPath;
use passd_daemon::http_server::api::client::ApiError;
use passd_daemon::http_server::api::v0::pass::{ChildType, ReadRequest, ReadResponse};

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Path to list or describe
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let request = ReadRequest {
            path: SecretPath::new(&self.path),
        };
        let response = ctx.client.call(request).await?;

        let output = match response {
            ReadResponse::Secret(secret) => format!(
                "{} ({})\n  recipients: {}\n  size: {} bytes (base64)",
                secret.name,
                secret.path,
                secret.recipients,
                secret.contents.len()
            ),
            ReadResponse::Directory(dir) => {
                let mut lines = vec![format!("recipients: {}", dir.recipients)];
                for child in dir.children {
                    let name = match child.child_type {
                        ChildType::Dir => format!("{}/", child.name),
                        ChildType::File => child.name,
                    };
                    lines.push(format!("  {}", name));
                }
                lines.join("\n")
            }
        };

        Ok(output)
    }
}
