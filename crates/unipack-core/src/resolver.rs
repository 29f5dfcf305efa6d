//! Component resolution.
//!
//! Before a build runs, every component a project declares must be on local
//! storage. The [`Puller`] refreshes the catalog, applies the project's
//! template, and then fetches whatever is not already satisfied.

use crate::catalog::{Catalog, CatalogQuery};
use crate::error::{Error, Result};
use crate::package::{Package, PullOptions};
use crate::project::Project;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use unipack_schema::{AuthConfig, Identity};

/// Pick the only match or fail.
///
/// Zero matches is [`Error::NotFound`], more than one is
/// [`Error::Ambiguous`]. Neither is ever resolved by preference.
///
/// # Errors
///
/// Returns an error unless `matches` holds exactly one package.
pub fn select_single(
    mut matches: Vec<Box<dyn Package>>,
    identity: Identity,
) -> Result<Box<dyn Package>> {
    match matches.len() {
        0 => Err(Error::NotFound(identity)),
        1 => Ok(matches.remove(0)),
        count => Err(Error::Ambiguous { identity, count }),
    }
}

/// Materializes a project's template and components.
pub struct Puller {
    catalog: Arc<dyn Catalog>,
    workdir: PathBuf,
    auth: AuthConfig,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for Puller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Puller")
            .field("workdir", &self.workdir)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Puller {
    /// A puller fetching into `workdir` through `catalog`.
    pub fn new(catalog: Arc<dyn Catalog>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            workdir: workdir.into(),
            auth: AuthConfig::default(),
            cancel: None,
        }
    }

    /// Credentials passed to queries and pulls.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Stop between components once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    async fn find(&self, query: &CatalogQuery) -> Result<Box<dyn Package>> {
        let matches = self.catalog.query(query).await?;
        select_single(matches, query.identity())
    }

    /// Make every component of `project` available locally.
    ///
    /// Returns the project with its template merged in. On failure, components
    /// pulled earlier in the same pass are left on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be refreshed, the template cannot
    /// be resolved or loaded, any component has zero or several matches, or
    /// any pull fails.
    pub async fn pull(&self, project: &Project) -> Result<Project> {
        self.catalog
            .update()
            .await
            .map_err(|e| e.context("could not update package index"))?;

        let project = match project.template() {
            Some(template) => {
                self.check_cancelled()?;
                if template.is_satisfied_locally() || template.is_present() {
                    tracing::debug!("template {} is available locally", template.identity());
                } else {
                    tracing::info!("resolving template {}", template.identity());
                    let package = self
                        .find(&CatalogQuery::for_component(&template, &self.auth))
                        .await?;
                    let opts = PullOptions::new(&self.workdir)
                        .with_cache(true)
                        .with_auth(self.auth.clone())
                        .with_dest(&template.path);
                    package
                        .pull(&opts)
                        .await
                        .map_err(|e| e.context("could not pull template"))?;
                }

                // A template edited in place is loaded from its source
                let location = if Path::new(&template.source).is_dir() {
                    PathBuf::from(&template.source)
                } else {
                    template.path.clone()
                };
                let loaded = Project::load(&location).await.map_err(|e| {
                    e.context(format!("could not load template {}", template.identity()))
                })?;
                project.merge_template(&loaded)?
            }
            None => project.clone(),
        };

        let mut missing = Vec::new();
        for component in project.components()? {
            self.check_cancelled()?;
            if component.is_satisfied_locally() {
                tracing::debug!("{} is satisfied locally", component.identity());
                continue;
            }
            let query = CatalogQuery::for_component(&component, &self.auth);
            missing.push((self.find(&query).await?, component.path));
        }

        for (package, dest) in &missing {
            self.check_cancelled()?;
            let opts = PullOptions::new(&self.workdir)
                .with_auth(self.auth.clone())
                .with_dest(dest);
            package.pull(&opts).await?;
        }

        tracing::info!("{} components pulled", missing.len());
        Ok(project)
    }
}
