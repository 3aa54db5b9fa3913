//! Dependency manager
//!
//! Materializes a chart's dependencies under `charts/`, driven by
//! `Chart.yaml` and `Chart.lock`:
//!
//! - `build` downloads what `Chart.lock` pins, resolving first when there is
//!   no lock yet
//! - `update` re-resolves every dependency and rewrites `Chart.lock`
//!
//! Dependencies already present with the pinned version are left alone, so
//! running `build` twice performs no work the second time.

use chartkit_core::archive;
use chartkit_core::chart::CHARTS_DIR;
use chartkit_core::{Chart, ChartLock, LockedDependency};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::RepositoryConfig;
use crate::downloader::{ChartDownloader, resolve_entry};
use crate::error::{RepoError, Result};
use crate::getter::Getters;
use crate::resolver::{DependencySource, Resolver, archives_in, is_vendored};
use crate::settings::Settings;

pub struct Manager<'a> {
    chart_path: PathBuf,
    settings: &'a Settings,
    getters: &'a Getters,
    /// Progress messages
    out: &'a mut (dyn Write + Send),
}

impl<'a> Manager<'a> {
    pub fn new(
        chart_path: impl Into<PathBuf>,
        settings: &'a Settings,
        getters: &'a Getters,
        out: &'a mut (dyn Write + Send),
    ) -> Self {
        Self {
            chart_path: chart_path.into(),
            settings,
            getters,
            out,
        }
    }

    pub fn chart_path(&self) -> &Path {
        &self.chart_path
    }

    /// Download the dependencies pinned in `Chart.lock`
    ///
    /// Without a lock file this is an [`update`](Self::update). A lock whose
    /// digest no longer matches `Chart.yaml` is an error.
    pub async fn build(&mut self) -> Result<()> {
        let chart = Chart::load(&self.chart_path)?;
        let requested = &chart.metadata.dependencies;
        if requested.is_empty() {
            return Ok(());
        }

        let Some(lock) = &chart.lock else {
            return self.update().await;
        };
        if lock.is_outdated(requested)? {
            return Err(RepoError::LockOutOfSync);
        }

        let config = RepositoryConfig::load(&self.settings.repository_config)?;
        let mut downloader = ChartDownloader::new(self.settings, self.getters);
        self.download_all(&lock.dependencies, &config, &mut downloader)
            .await
    }

    /// Resolve every dependency again, download them and rewrite `Chart.lock`
    pub async fn update(&mut self) -> Result<()> {
        let chart = Chart::load(&self.chart_path)?;
        let requested = chart.metadata.dependencies.clone();
        if requested.is_empty() {
            return Ok(());
        }

        let config = RepositoryConfig::load(&self.settings.repository_config)?;
        let mut downloader = ChartDownloader::new(self.settings, self.getters);

        writeln!(
            self.out,
            "Hang tight while we grab the latest from your chart repositories..."
        )?;
        let locked = Resolver::new(&self.chart_path)
            .resolve(&requested, &config, downloader.indexes())
            .await?;
        writeln!(self.out, "Update Complete.")?;

        self.download_all(&locked, &config, &mut downloader).await?;

        let lock = ChartLock::new(&requested, locked)?;
        let unchanged = chart
            .lock
            .as_ref()
            .is_some_and(|old| old.digest == lock.digest && old.dependencies == lock.dependencies);
        if !unchanged {
            lock.save(&self.chart_path.join(chart.lock_file_name()))?;
        }
        Ok(())
    }

    async fn download_all(
        &mut self,
        locked: &[LockedDependency],
        config: &RepositoryConfig,
        downloader: &mut ChartDownloader<'_>,
    ) -> Result<()> {
        let charts_dir = self.chart_path.join(CHARTS_DIR);
        std::fs::create_dir_all(&charts_dir)?;

        writeln!(self.out, "Saving {} charts", locked.len())?;
        for dep in locked {
            match DependencySource::classify(&dep.repository, &self.chart_path, config)? {
                DependencySource::Vendored => {
                    if !is_vendored(&self.chart_path, &dep.name) {
                        return Err(RepoError::DependencyMissing {
                            name: dep.name.clone(),
                        });
                    }
                    writeln!(
                        self.out,
                        "Dependency {} did not declare a repository. Assuming it exists in the charts directory",
                        dep.name
                    )?;
                    continue;
                }
                _ if is_present(&charts_dir, dep) => {
                    writeln!(
                        self.out,
                        "Dependency {} {} is already present",
                        dep.name, dep.version
                    )?;
                }
                DependencySource::Local(path) => {
                    writeln!(self.out, "Packaging {} from {}", dep.name, path.display())?;
                    let chart = Chart::load(&path)?;
                    archive::package(&chart, &charts_dir)?;
                }
                DependencySource::Repository(repo) => {
                    writeln!(self.out, "Downloading {} from repo {}", dep.name, repo.url)?;
                    let stale = downloader
                        .indexes()
                        .cached(&repo)
                        .await?
                        .get(&dep.name, &dep.version)
                        .is_none();
                    let index = if stale {
                        downloader.indexes().refresh(&repo).await?
                    } else {
                        downloader.indexes().cached(&repo).await?
                    };
                    let cv = index.get(&dep.name, &dep.version).ok_or_else(|| {
                        RepoError::ChartNotFound {
                            name: dep.name.clone(),
                            version: dep.version.clone(),
                            repo: repo.url.clone(),
                        }
                    })?;
                    let resolved = resolve_entry(&repo, cv.download_url(), &dep.name, cv.digest.clone())?;
                    downloader
                        .download_file(&resolved, &charts_dir.join(archive_file_name(dep)))
                        .await?;
                }
            }

            self.remove_outdated(&charts_dir, dep)?;
        }

        Ok(())
    }

    /// Delete archives of other versions of `dep`
    fn remove_outdated(&mut self, charts_dir: &Path, dep: &LockedDependency) -> Result<()> {
        for (path, chart) in archives_in(charts_dir) {
            if chart.name() == dep.name && chart.version() != dep.version {
                writeln!(self.out, "Deleting outdated charts: {}", path.display())?;
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn archive_file_name(dep: &LockedDependency) -> String {
    format!("{}-{}.tgz", dep.name, dep.version)
}

/// Whether `dep` is already under `charts/` at the pinned version
fn is_present(charts_dir: &Path, dep: &LockedDependency) -> bool {
    [charts_dir.join(archive_file_name(dep)), charts_dir.join(&dep.name)]
        .iter()
        .filter(|path| path.exists())
        .filter_map(|path| Chart::load(path).ok())
        .any(|chart| chart.name() == dep.name && chart.version() == dep.version)
}
