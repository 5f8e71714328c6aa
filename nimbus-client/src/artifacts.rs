//! Artifact transport: uploads and result downloads

use std::path::Path;

use reqwest::multipart::{Form, Part};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use nimbus_core::domain::project::ArtifactKind;
use nimbus_core::domain::run::RunHandle;
use nimbus_core::dto::run::FileUpload;

use crate::CloudClient;
use crate::error::{ClientError, Result};

impl CloudClient {
    /// Upload a local file to the project and return its artifact id
    ///
    /// A failure to read the local file surfaces as [`ClientError::Io`];
    /// no request is made in that case.
    pub async fn upload_artifact(
        &self,
        project_id: u64,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<u64> {
        let bytes = fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        debug!("uploading {} ({} bytes) as {}", path.display(), bytes.len(), kind);

        let form = Form::new()
            .text("type", kind.as_str())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/api/v2/projects/{}/files", self.base_url, project_id);
        let response = self.post(&url).multipart(form).send().await?;

        let upload: FileUpload = self.handle_response(response).await?;
        Ok(upload.id)
    }

    /// Download the result bundle of a finished run into `dest_dir`
    ///
    /// The bundle is written as `test-run-<id>.zip`; screenshots are
    /// included when requested.
    pub async fn download_results(
        &self,
        handle: RunHandle,
        dest_dir: &Path,
        with_screenshots: bool,
    ) -> Result<()> {
        fs::create_dir_all(dest_dir).await?;

        let url = format!(
            "{}/api/v2/projects/{}/runs/{}/results?screenshots={}",
            self.base_url, handle.project_id, handle.run_id, with_screenshots
        );
        let mut response = self.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let dest = dest_dir.join(format!("test-run-{}.zip", handle.run_id));
        let mut file = fs::File::create(&dest).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!("results for run {} written to {}", handle, dest.display());
        Ok(())
    }
}
