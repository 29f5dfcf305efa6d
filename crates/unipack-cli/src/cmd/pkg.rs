//! Pkg command

use crate::PkgArgs;
use crate::ui::TerminalRenderers;
use anyhow::{Result, bail};
use std::sync::Arc;
use unipack_core::packager::default_packagers;
use unipack_core::{
    ArchiveRootfsBuilder, Config, PackContext, PackOption, PackOptions, Project,
    TarballPackManager, dispatch,
};

/// Package a kernel, or every matching target of the project in `args.dir`
pub async fn pkg(config: Arc<Config>, args: PkgArgs) -> Result<()> {
    let workdir = super::absolute(&args.dir)?;
    let cancel = super::interrupt_token();

    if !args.format.is_empty() && args.format != TarballPackManager::FORMAT {
        bail!("unsupported package format: {}", args.format);
    }
    let labels = parse_labels(&args.labels)?;

    let project = if Project::exists_in(&workdir) {
        let loaded = Project::load(&workdir).await?;
        // Components only matter when packaging from the project
        if args.no_pull || !args.kernel.is_empty() {
            Some(loaded)
        } else {
            Some(super::pull::pull_project(&config, &loaded, cancel.clone()).await?)
        }
    } else {
        None
    };

    let mut opts = PackOptions {
        kernel: args.kernel,
        platform: args.plat,
        architecture: args.arch,
        rootfs: args.rootfs,
        compress: args.compress,
        name: args.name,
        format: args.format,
        output: args.output.map(|o| workdir.join(o)),
        args: args.args,
        env: args.env,
        no_kconfig: args.no_kconfig,
        parallel: args.parallel,
        project,
        extra: labels,
        ..PackOptions::new(&workdir)
    };

    let packagers = default_packagers();
    let packager = dispatch(&packagers, &mut opts)?;

    let ctx = PackContext {
        config,
        pack_manager: Arc::new(TarballPackManager::new(&workdir)),
        rootfs_builder: Arc::new(ArchiveRootfsBuilder),
        renderers: Arc::new(TerminalRenderers),
        cancel: Some(cancel),
    };
    let packages = packager.pack(&ctx, &mut opts).await?;

    for package in &packages {
        match package.path() {
            Some(path) => println!("{} {}", package.identity(), path.display()),
            None => println!("{}", package.identity()),
        }
    }
    Ok(())
}

/// Parse repeated `KEY=VALUE` labels.
fn parse_labels(raw: &[String]) -> Result<Vec<PackOption>> {
    raw.iter()
        .map(|label| match label.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Ok(PackOption::Label(key.to_string(), value.to_string()))
            }
            _ => bail!("invalid label {label:?}, expected KEY=VALUE"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(&["team=infra".into(), "note=a=b".into()]).unwrap();
        assert_eq!(
            labels,
            vec![
                PackOption::Label("team".into(), "infra".into()),
                PackOption::Label("note".into(), "a=b".into()),
            ]
        );
        assert!(parse_labels(&["novalue".into()]).is_err());
        assert!(parse_labels(&["=x".into()]).is_err());
    }
}
