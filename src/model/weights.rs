use crate::config::ModelConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Returns the local weights file, downloading it first if it is missing and
/// `weights_url` is set. The download happens once; later starts reuse the file.
pub async fn ensure_weights(config: &ModelConfig) -> Result<PathBuf> {
    let path = PathBuf::from(&config.weights_path);

    if tokio::fs::try_exists(&path).await? {
        debug!("Using cached weights at {}", path.display());
        return Ok(path);
    }

    let Some(url) = config.weights_url.as_deref() else {
        return Err(Error::config(format!(
            "Model weights not found at {} and no weights_url is configured",
            path.display()
        )));
    };

    download(url, &path).await?;
    Ok(path)
}

async fn download(url: &str, path: &Path) -> Result<()> {
    info!("Downloading model weights from {}", url);

    let response = reqwest::get(url).await?.error_for_status()?;
    let bytes = response.bytes().await?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    // The final path only ever holds a complete file.
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, path).await?;

    info!(
        "Saved {} bytes of model weights to {}",
        bytes.len(),
        path.display()
    );
    Ok(())
}
