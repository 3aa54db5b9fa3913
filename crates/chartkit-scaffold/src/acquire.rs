//! Materializing a chart into the workspace
//!
//! Each strategy leaves an unpacked chart at `<workspace>/<name>/` and
//! returns the chart as loaded before any dependency work.

use chartkit_core::{Chart, save_dir, scaffold};
use chartkit_repo::{ChartDownloader, Getters, Settings};
use std::path::Path;

use crate::error::{AcquireError, Result};
use crate::source::ChartSource;
use crate::CreateOptions;

pub struct ChartAcquirer<'a> {
    settings: &'a Settings,
    getters: &'a Getters,
}

impl<'a> ChartAcquirer<'a> {
    pub fn new(settings: &'a Settings, getters: &'a Getters) -> Self {
        Self { settings, getters }
    }

    /// Acquire the chart `source` points at
    pub async fn acquire(
        &self,
        workspace: &Path,
        source: &ChartSource,
        opts: &CreateOptions,
    ) -> Result<Chart> {
        match source {
            ChartSource::Empty => self.scaffold_default(workspace, &opts.gvk.kind),
            ChartSource::LocalFile(path) | ChartSource::LocalDirectory(path) => {
                self.load_from_disk(workspace, path)
            }
            ChartSource::Remote(_) => self.fetch_from_repository(workspace, opts).await,
        }
    }

    /// Write Helm's default chart, named after the lower-cased `kind`
    pub fn scaffold_default(&self, workspace: &Path, kind: &str) -> Result<Chart> {
        let chart_dir =
            scaffold::create(&kind.to_lowercase(), workspace).map_err(AcquireError::Scaffold)?;
        tracing::debug!(path = %chart_dir.display(), "scaffolded default chart");
        reload_chart(&chart_dir)
    }

    /// Load a chart archive or directory and save a copy into the workspace
    pub fn load_from_disk(&self, workspace: &Path, path: &Path) -> Result<Chart> {
        let chart = Chart::load(path).map_err(|e| AcquireError::load(path, e))?;
        let chart_dir = save_dir(&chart, workspace).map_err(|e| AcquireError::load(path, e))?;
        tracing::debug!(
            source = %path.display(),
            path = %chart_dir.display(),
            chart = chart.name(),
            "copied chart into workspace"
        );
        Ok(chart)
    }

    /// Download the chart from a repository, then load it like a local one
    ///
    /// With `opts.repo` set the chart name is looked up in that repository's
    /// index. Otherwise `opts.chart` is a `repo/chart` reference or a URL.
    pub async fn fetch_from_repository(
        &self,
        workspace: &Path,
        opts: &CreateOptions,
    ) -> Result<Chart> {
        let reference = opts.chart.as_str();
        let version = opts.version.as_deref().unwrap_or_default();
        let mut downloader = ChartDownloader::new(self.settings, self.getters);

        let archive = match opts.repo.as_deref().filter(|repo| !repo.is_empty()) {
            Some(repo) => {
                let resolved = downloader
                    .find_chart_in_repo_url(repo, reference, version)
                    .await
                    .map_err(|e| AcquireError::fetch(reference, e))?;
                downloader.download_resolved(&resolved, workspace).await
            }
            None => downloader.download_to(reference, version, workspace).await,
        }
        .map_err(|e| AcquireError::fetch(reference, e))?;

        tracing::debug!(reference, path = %archive.display(), "downloaded chart");
        self.load_from_disk(workspace, &archive)
    }
}

/// Parse the chart at `path` again, picking up changes made on disk
pub fn reload_chart(path: &Path) -> Result<Chart> {
    Chart::load(path).map_err(|e| AcquireError::load(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gvk;
    use tempfile::TempDir;

    fn settings(temp: &TempDir) -> Settings {
        Settings::new(
            temp.path().join("repositories.yaml"),
            temp.path().join("cache"),
        )
    }

    #[test]
    fn test_scaffold_default() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let getters = Getters::empty();
        let acquirer = ChartAcquirer::new(&settings, &getters);

        let chart = acquirer.scaffold_default(temp.path(), "Memcached").unwrap();
        assert_eq!(chart.name(), "memcached");
        assert!(temp.path().join("memcached/Chart.yaml").is_file());
        assert!(
            chart
                .template_names()
                .contains(&"templates/deployment.yaml")
        );
    }

    #[test]
    fn test_scaffold_empty_kind() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let getters = Getters::empty();
        let acquirer = ChartAcquirer::new(&settings, &getters);

        let err = acquirer.scaffold_default(temp.path(), "").unwrap_err();
        assert!(matches!(err, AcquireError::Scaffold(_)));
    }

    #[test]
    fn test_load_from_disk_copies_into_workspace() {
        let source = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let chart_dir = scaffold::create("nginx", source.path()).unwrap();

        let settings = settings(&source);
        let getters = Getters::empty();
        let acquirer = ChartAcquirer::new(&settings, &getters);

        let chart = acquirer.load_from_disk(workspace.path(), &chart_dir).unwrap();
        assert_eq!(chart.name(), "nginx");
        assert!(workspace.path().join("nginx/Chart.yaml").is_file());
        assert!(workspace.path().join("nginx/templates/service.yaml").is_file());
    }

    #[test]
    fn test_load_malformed_chart() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("Chart.yaml"), "name: broken\nversion: not-semver\n").unwrap();

        let settings = settings(&temp);
        let getters = Getters::empty();
        let acquirer = ChartAcquirer::new(&settings, &getters);

        let err = acquirer
            .load_from_disk(&temp.path().join("ws"), &broken)
            .unwrap_err();
        assert!(matches!(err, AcquireError::Load { ref path, .. } if path == &broken));
    }

    #[tokio::test]
    async fn test_unknown_named_repository() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let getters = Getters::all();
        let acquirer = ChartAcquirer::new(&settings, &getters);

        let opts = CreateOptions {
            gvk: Gvk::default(),
            chart: "myrepo/missing-chart".to_string(),
            ..Default::default()
        };
        let err = acquirer
            .fetch_from_repository(temp.path(), &opts)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::Fetch { ref reference, .. } if reference == "myrepo/missing-chart")
        );
    }
}
