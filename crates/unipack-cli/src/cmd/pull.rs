//! Pull command

use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use unipack_core::{Config, IndexCatalog, Project, Puller};

/// Make the template and components of the project in `dir` available locally
pub async fn pull(config: &Config, dir: &Path) -> Result<()> {
    let workdir = super::absolute(dir)?;
    if !Project::exists_in(&workdir) {
        bail!("no project found in {}", workdir.display());
    }
    let project = Project::load(&workdir).await?;
    let merged = pull_project(config, &project, super::interrupt_token()).await?;

    for component in merged.components()? {
        println!("{} {}", component.identity(), component.path.display());
    }
    Ok(())
}

/// Run a [`Puller`] over the configured catalog sources.
pub(crate) async fn pull_project(
    config: &Config,
    project: &Project,
    cancel: CancellationToken,
) -> Result<Project> {
    let catalog = IndexCatalog::new(config.catalog.sources.clone(), config.cache_path())
        .with_auth(config.auth.clone());
    let puller = Puller::new(Arc::new(catalog), project.workdir())
        .with_auth(config.auth.clone())
        .with_cancellation(cancel);

    tracing::info!("pulling components for {}", project.name());
    Ok(puller.pull(project).await?)
}
