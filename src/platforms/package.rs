// ABOUTME: Packs the exported directory into a tarball and uploads it to S3.
// ABOUTME: Shared by the S3, CodeDeploy, and Elastic Beanstalk deploy steps.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Halt, StepResult, path_str, run_checked, safe_name, staged_dir};
use crate::aws::S3Api;
use crate::aws::types::{PutObjectRequest, S3Location};
use crate::exec::{CommandExecutor, shell_quote};
use crate::pipeline::StepContext;

/// Where and how a bundle is uploaded.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleParams {
    pub bucket: String,
    /// Key prefix; the bundle name is appended.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Delete the uploaded bundle if the pipeline fails.
    #[serde(default)]
    pub cleanup_on_failure: bool,
}

impl BundleParams {
    pub fn location(&self, job_id: &str) -> S3Location {
        let name = format!("{}.tar.gz", safe_name(job_id));
        let key = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, name),
            _ => name,
        };
        S3Location {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

/// Tar the exported directory into a private temp dir.
///
/// The dir is registered for removal before `tar` runs, so a partial archive
/// is cleaned up too. Each call gets its own dir.
pub(super) async fn archive(
    ctx: &StepContext<'_>,
    local: &dyn CommandExecutor,
) -> StepResult<PathBuf> {
    let dir = staged_dir(ctx);
    let name = safe_name(ctx.execution.job().id.as_str());
    let scratch = tempfile::Builder::new()
        .prefix(&format!("hal-{}-", name))
        .tempdir()
        .map_err(|e| Halt::failed(format!("cannot create archive dir: {}", e)))?;
    let archive = scratch.path().join(format!("{}.tar.gz", name));

    ctx.cleanup.register(
        format!("remove {}", scratch.path().display()),
        move || async move { scratch.close() },
    );

    ctx.info(&format!("Packing {}", dir.display()));
    run_checked(
        local,
        &tar_command(&archive, &dir),
        &HashMap::new(),
        "tar",
    )
    .await?;

    Ok(archive)
}

fn tar_command(archive: &Path, dir: &Path) -> String {
    format!(
        "tar -czf {} -C {} .",
        shell_quote(&path_str(archive)),
        shell_quote(&path_str(dir))
    )
}

/// Upload `archive` to `location`, registering its deletion on failure when asked.
pub(super) async fn upload(
    ctx: &StepContext<'_>,
    s3: &Arc<dyn S3Api>,
    archive: &Path,
    location: &S3Location,
    cleanup_on_failure: bool,
) -> StepResult<()> {
    ctx.info(&format!("Uploading {}", location));
    s3.put_object(&PutObjectRequest {
        location: location.clone(),
        source: archive.to_path_buf(),
        content_type: Some("application/gzip".to_string()),
    })
    .await?;

    if cleanup_on_failure {
        let s3 = Arc::clone(s3);
        let location = location.clone();
        ctx.cleanup
            .register_on_failure(format!("delete {}", location), move || async move {
                s3.delete_object(&location).await
            });
    }
    Ok(())
}
