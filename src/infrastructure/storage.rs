use crate::config::AnalysisConfig;
use anyhow::Context;
use tracing::info;

/// Creates the upload and result directories when missing
pub async fn setup_storage(config: &AnalysisConfig) -> anyhow::Result<()> {
    for dir in [&config.upload_dir, &config.result_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    info!(
        "📁 Storage: uploads in {}, results in {}",
        config.upload_dir.display(),
        config.result_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            upload_dir: dir.path().join("static").join("uploads"),
            result_dir: dir.path().join("static").join("results"),
            ..AnalysisConfig::default()
        };

        setup_storage(&config).await.unwrap();
        setup_storage(&config).await.unwrap();

        assert!(config.upload_dir.is_dir());
        assert!(config.result_dir.is_dir());
    }
}
