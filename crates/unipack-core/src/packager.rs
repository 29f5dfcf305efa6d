//! Packaging strategies and dispatch.
//!
//! Each [`Packager`] decides from the user's options whether it can handle
//! the request. [`dispatch`] tries them in order and picks the first that
//! can; the chosen packager then runs its work as a [`ProcessTree`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::Package;
use crate::packmanager::{PackManager, PackOption};
use crate::process_tree::{ProcessTree, ProcessTreeItem, ProcessTreeOptions};
use crate::project::{Project, TargetSpec};
use crate::reporter::{RenderMode, RendererFactory, TaskReporter};
use crate::rootfs::{RootfsBuilder, RootfsOutput};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use unipack_schema::{Architecture, Platform, Target};

/// A packaging request.
///
/// Mutated only by the packager handling it (architecture back-filled from a
/// combined `platform/arch`, rootfs rewritten to the built archive, discovered
/// command and environment merged in).
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Directory relative paths are resolved against.
    pub workdir: PathBuf,
    /// Kernel artifact.
    pub kernel: String,
    /// Platform, optionally in `platform/arch` form.
    pub platform: String,
    /// Architecture.
    pub architecture: String,
    /// Rootfs spec handed to the rootfs builder.
    pub rootfs: String,
    /// Compress the rootfs archive.
    pub compress: bool,
    /// Package name.
    pub name: String,
    /// Package format; defaults to the pack manager's.
    pub format: String,
    /// Output file.
    pub output: Option<PathBuf>,
    /// Kernel arguments.
    pub args: Vec<String>,
    /// Explicit environment variables (`KEY=VALUE`).
    pub env: Vec<String>,
    /// Leave the kernel configuration out of the package.
    pub no_kconfig: bool,
    /// Package several targets concurrently.
    pub parallel: bool,
    /// Project loaded from the workdir, if any.
    pub project: Option<Project>,
    /// Options forwarded to the pack manager untouched.
    pub extra: Vec<PackOption>,
}

impl PackOptions {
    /// Options for packaging in `workdir`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ..Self::default()
        }
    }

    /// Split a combined `platform/arch` when no architecture is set.
    /// Calling it again is a no-op.
    fn split_platform(&mut self) {
        if self.architecture.is_empty() {
            if let Some((plat, arch)) = self.platform.split_once('/') {
                let (plat, arch) = (plat.to_string(), arch.to_string());
                self.platform = plat;
                self.architecture = arch;
            }
        }
    }

    /// The project's environment with the explicit variables laid over it.
    ///
    /// Empty when there is no project or it declares no environment.
    pub fn aggregate_envs(&self) -> Vec<String> {
        let Some(project) = &self.project else {
            return Vec::new();
        };
        if project.env().is_empty() {
            return Vec::new();
        }

        let mut order = Vec::new();
        let mut values = BTreeMap::new();
        for var in project.env().iter().chain(&self.env) {
            let key = var.split_once('=').map_or(var.as_str(), |(k, _)| k);
            if values.insert(key.to_string(), var.clone()).is_none() {
                order.push(key.to_string());
            }
        }
        order
            .into_iter()
            .filter_map(|key| values.remove(&key))
            .collect()
    }

    /// Effective format name.
    fn format_name<'a>(&'a self, pm: &'a dyn PackManager) -> &'a str {
        if self.format.is_empty() {
            pm.format()
        } else {
            &self.format
        }
    }

    /// Fold a rootfs build result in: the archive replaces the spec, a
    /// discovered command only fills empty args, discovered env is appended.
    fn apply_rootfs(&mut self, built: RootfsOutput) {
        self.rootfs = built
            .path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.args.is_empty() {
            if let Some(command) = built.command {
                self.args = command;
            }
        }
        if let Some(env) = built.env {
            self.env.extend(env);
        }
    }

    /// Options handed to the pack manager.
    fn pack_options(&self) -> Vec<PackOption> {
        let mut popts = self.extra.clone();
        popts.push(PackOption::Args(self.args.clone()));
        if !self.rootfs.is_empty() {
            popts.push(PackOption::Initrd(PathBuf::from(&self.rootfs)));
        }
        popts.push(PackOption::KConfig(!self.no_kconfig));
        if !self.name.is_empty() {
            popts.push(PackOption::Name(self.name.clone()));
        }
        if let Some(output) = &self.output {
            popts.push(PackOption::Output(output.clone()));
        }

        let envs = self.aggregate_envs();
        if !envs.is_empty() {
            popts.push(PackOption::Envs(envs));
        } else if !self.env.is_empty() {
            popts.push(PackOption::Envs(self.env.clone()));
        }
        popts
    }
}

/// Collaborators a packager works with, resolved once by the caller.
#[derive(Clone)]
pub struct PackContext {
    /// Process configuration; only the log type is read here.
    pub config: Arc<Config>,
    /// Writes the packages.
    pub pack_manager: Arc<dyn PackManager>,
    /// Prepares the rootfs.
    pub rootfs_builder: Arc<dyn RootfsBuilder>,
    /// Supplies the process tree renderer.
    pub renderers: Arc<dyn RendererFactory>,
    /// Checked before each packaging task starts.
    pub cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for PackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackContext")
            .field("config", &self.config)
            .field("format", &self.pack_manager.format())
            .finish_non_exhaustive()
    }
}

impl PackContext {
    /// Renderer for the configured log type.
    pub fn renderer(&self) -> Arc<dyn TaskReporter> {
        self.renderers
            .renderer(RenderMode::from_log_type(self.config.log.log_type))
    }

    fn tree_options(&self, parallel: bool) -> ProcessTreeOptions {
        let options = ProcessTreeOptions::new()
            .parallel(parallel)
            .with_renderer(self.renderer());
        match &self.cancel {
            Some(token) => options.with_cancellation(token.clone()),
            None => options,
        }
    }
}

/// A packaging strategy, tried in order by [`dispatch`].
#[async_trait]
pub trait Packager: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this packager handles `opts`.
    ///
    /// May normalize `opts` (e.g. split `platform/arch`). An inapplicable
    /// packager returns a usage error explaining what is missing.
    ///
    /// # Errors
    ///
    /// Returns a usage error when required inputs are missing.
    fn packagable(&self, opts: &mut PackOptions) -> Result<bool>;

    /// Produce packages. Returns nothing unless every step succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the rootfs, the target or any packaging task fails.
    async fn pack(&self, ctx: &PackContext, opts: &mut PackOptions) -> Result<Vec<Box<dyn Package>>>;
}

/// The packagers tried by [`dispatch`], in order.
pub fn default_packagers() -> Vec<Box<dyn Packager>> {
    vec![Box::new(KernelPackager), Box::new(ProjectPackager)]
}

/// Pick the first packager that can handle `opts`.
///
/// # Errors
///
/// Returns `cannot package: <reason>` with the last packager's usage error
/// when none applies, or any non-usage error a packager raised.
pub fn dispatch<'p>(
    packagers: &'p [Box<dyn Packager>],
    opts: &mut PackOptions,
) -> Result<&'p dyn Packager> {
    let mut last = Error::usage("no packagers available");
    for packager in packagers {
        match packager.packagable(opts) {
            Ok(true) => {
                tracing::debug!("using packager {}", packager.name());
                return Ok(packager.as_ref());
            }
            Ok(false) => {}
            Err(e) if e.is_usage() => {
                tracing::debug!("packager {} not applicable: {e}", packager.name());
                last = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::usage(format!("cannot package: {last}")))
}

/// A single packaging leaf pushing its packages into `results`.
fn pack_task<'a>(
    ctx: &'a PackContext,
    opts: &'a PackOptions,
    target: &'a Target,
    results: &'a Mutex<Vec<Box<dyn Package>>>,
) -> ProcessTreeItem<'a> {
    let title = format!(
        "packaging {} ({})",
        opts.name,
        opts.format_name(ctx.pack_manager.as_ref())
    );
    let subtitle = format!("{}/{}", target.platform(), target.architecture());

    ProcessTreeItem::new(title, subtitle, move || async move {
        let more = ctx.pack_manager.pack(target, opts.pack_options()).await?;
        results
            .lock()
            .map_err(|_| Error::Task("package results lock poisoned".to_string()))?
            .extend(more);
        Ok(())
    })
}

fn into_results(results: Mutex<Vec<Box<dyn Package>>>) -> Result<Vec<Box<dyn Package>>> {
    results
        .into_inner()
        .map_err(|_| Error::Task("package results lock poisoned".to_string()))
}

/// Packages a kernel named on the command line (`--kernel` with `--plat`).
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelPackager;

#[async_trait]
impl Packager for KernelPackager {
    fn name(&self) -> &'static str {
        "cli-kernel"
    }

    fn packagable(&self, opts: &mut PackOptions) -> Result<bool> {
        if !opts.kernel.is_empty() && !opts.platform.is_empty() {
            opts.split_platform();
            return Ok(true);
        }

        if !opts.kernel.is_empty() {
            tracing::warn!(
                "--kernel flag set but must be used in conjunction with -m|--arch and/or -p|--plat"
            );
        }

        Err(Error::usage(
            "cannot package without path to -k|--kernel, -m|--arch and -p|--plat",
        ))
    }

    async fn pack(&self, ctx: &PackContext, opts: &mut PackOptions) -> Result<Vec<Box<dyn Package>>> {
        let target = Target::builder()
            .with_architecture(Architecture::new(&opts.architecture))
            .with_platform(Platform::new(&opts.platform))
            .with_kernel(opts.workdir.join(&opts.kernel))
            .with_command(opts.args.clone())
            .build()?;

        let built = ctx
            .rootfs_builder
            .build(&opts.workdir, &opts.rootfs, opts.compress, target.architecture())
            .await
            .map_err(|e| e.context("could not build rootfs"))?;
        opts.apply_rootfs(built);

        let results = Mutex::new(Vec::new());
        let opts: &PackOptions = opts;
        let tree = ProcessTree::new(
            ctx.tree_options(false),
            vec![pack_task(ctx, opts, &target, &results)],
        )?;
        tree.start().await?;

        into_results(results)
    }
}

/// Packages every target a project declares.
///
/// Applies when no kernel is given on the command line. `--plat` and `--arch`
/// narrow the targets instead of naming them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectPackager;

impl ProjectPackager {
    fn matching_targets(opts: &PackOptions) -> Vec<TargetSpec> {
        let Some(project) = &opts.project else {
            return Vec::new();
        };
        let plat = Platform::new(&opts.platform);
        let arch = Architecture::new(&opts.architecture);
        project
            .targets()
            .into_iter()
            .filter(|t| t.kernel.is_some())
            .filter(|t| plat.is_empty() || Platform::new(&t.plat) == plat)
            .filter(|t| arch.is_empty() || Architecture::new(&t.arch) == arch)
            .collect()
    }
}

#[async_trait]
impl Packager for ProjectPackager {
    fn name(&self) -> &'static str {
        "project"
    }

    fn packagable(&self, opts: &mut PackOptions) -> Result<bool> {
        if !opts.kernel.is_empty() {
            return Ok(false);
        }
        if opts.project.is_none() {
            return Err(Error::usage(format!(
                "no project found in {}",
                opts.workdir.display()
            )));
        }

        opts.split_platform();
        if Self::matching_targets(opts).is_empty() {
            return Err(Error::usage(
                "project declares no built target matching -p|--plat and -m|--arch",
            ));
        }
        Ok(true)
    }

    async fn pack(&self, ctx: &PackContext, opts: &mut PackOptions) -> Result<Vec<Box<dyn Package>>> {
        let specs = Self::matching_targets(opts);
        if specs.len() > 1 && opts.output.is_some() {
            return Err(Error::usage(
                "--output cannot be used when packaging more than one target",
            ));
        }

        if let Some(project) = &opts.project {
            if opts.name.is_empty() {
                opts.name = project.name();
            }
            if opts.args.is_empty() {
                opts.args = project.command().to_vec();
            }
        }

        // One rootfs per architecture, built before any packaging starts
        let mut rootfs: BTreeMap<Architecture, RootfsOutput> = BTreeMap::new();
        let mut jobs = Vec::with_capacity(specs.len());
        for spec in specs {
            let kernel = spec.kernel.clone().unwrap_or_default();
            let target = Target::builder()
                .with_architecture(Architecture::new(&spec.arch))
                .with_platform(Platform::new(&spec.plat))
                .with_kernel(&kernel)
                .with_command(opts.args.clone())
                .build()?;

            let arch = target.architecture().clone();
            if !rootfs.contains_key(&arch) {
                let built = ctx
                    .rootfs_builder
                    .build(&opts.workdir, &opts.rootfs, opts.compress, &arch)
                    .await
                    .map_err(|e| e.context("could not build rootfs"))?;
                rootfs.insert(arch.clone(), built);
            }

            let mut job = opts.clone();
            job.kernel = kernel;
            job.platform = spec.plat;
            job.architecture = spec.arch;
            if let Some(built) = rootfs.get(&arch) {
                job.apply_rootfs(built.clone());
            }
            jobs.push((job, target));
        }

        let results = Mutex::new(Vec::new());
        let items = jobs
            .iter()
            .map(|(job, target)| pack_task(ctx, job, target, &results))
            .collect();
        let tree = ProcessTree::new(ctx.tree_options(opts.parallel), items)?;
        tree.start().await?;

        into_results(results)
    }
}
