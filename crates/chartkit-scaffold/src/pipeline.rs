//! The acquisition pipeline
//!
//! classify → acquire → build dependencies → reload → derive identity, all
//! inside one [`Workspace`].

use chartkit_core::{Chart, save_dir};
use chartkit_repo::{Getters, Manager, Settings};
use std::path::{Path, PathBuf};

use crate::acquire::{ChartAcquirer, reload_chart};
use crate::error::{AcquireError, Result};
use crate::identity::{Gvk, HELM_CHARTS_DIR, ProjectConfig, Resource, derive_resource};
use crate::source::ChartSource;
use crate::workspace::Workspace;

/// How to obtain the chart and name its resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Requested identity; unset fields are defaulted
    pub gvk: Gvk,

    /// Chart reference: empty, a local path, `repo/chart`, a chart name or a URL
    pub chart: String,

    /// Repository URL to look `chart` up in
    pub repo: Option<String>,

    /// Chart version or constraint, latest when unset
    pub version: Option<String>,

    /// `apiextensions.k8s.io` version for the generated CRD
    pub crd_version: String,

    /// Domain used when the project configuration has none
    pub domain: String,
}

/// Result of a successful acquisition
#[derive(Debug, Clone)]
pub struct ChartAcquisition {
    pub resource: Resource,
    /// The chart as reloaded after its dependencies were built
    pub chart: Chart,
}

/// Acquires charts with injected repository settings
pub struct ChartScaffolder {
    settings: Settings,
    getters: Getters,
}

impl ChartScaffolder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            getters: Getters::all(),
        }
    }

    pub fn with_getters(mut self, getters: Getters) -> Self {
        self.getters = getters;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Acquire the chart `opts` describes and derive its resource
    ///
    /// The workspace is removed before returning, whether or not the
    /// acquisition succeeded.
    pub async fn create_chart(
        &self,
        cfg: &ProjectConfig,
        opts: &CreateOptions,
    ) -> Result<ChartAcquisition> {
        let workspace = Workspace::create(self.settings.workspace_root())?;
        let source = ChartSource::classify(&opts.chart);
        tracing::debug!(reference = %opts.chart, source = ?source, "classified chart reference");

        let acquirer = ChartAcquirer::new(&self.settings, &self.getters);
        let chart = acquirer.acquire(workspace.path(), &source, opts).await?;
        let resource = derive_resource(
            chart.name(),
            &opts.gvk,
            &opts.domain,
            &opts.crd_version,
            cfg,
        );

        let chart_dir = workspace.path().join(chart.name());
        self.build_dependencies(&chart_dir).await?;
        let chart = reload_chart(&chart_dir)?;

        tracing::debug!(
            chart = chart.name(),
            kind = %resource.gvk.kind,
            dependencies = chart.dependencies().len(),
            "acquired chart"
        );
        Ok(ChartAcquisition { resource, chart })
    }

    /// Build the dependencies of the chart at `chart_dir`
    ///
    /// Manager output is kept only to be attached to an error.
    pub async fn build_dependencies(&self, chart_dir: &Path) -> Result<()> {
        let mut out = Vec::new();
        let result = Manager::new(chart_dir, &self.settings, &self.getters, &mut out)
            .build()
            .await;

        result.map_err(|source| {
            let output = String::from_utf8_lossy(&out).into_owned();
            AcquireError::Dependency {
                path: chart_dir.to_path_buf(),
                source,
                output: (!output.trim().is_empty()).then_some(output),
            }
        })
    }
}

/// Acquire a chart with repository settings taken from the environment
pub async fn create_chart(cfg: &ProjectConfig, opts: &CreateOptions) -> Result<ChartAcquisition> {
    let settings = Settings::from_env().map_err(AcquireError::Settings)?;
    ChartScaffolder::new(settings).create_chart(cfg, opts).await
}

/// Write `chart` into the project's `helm-charts/` directory
pub fn save_to_project(chart: &Chart, project_root: &Path) -> Result<PathBuf> {
    let charts_dir = project_root.join(HELM_CHARTS_DIR);
    save_dir(chart, &charts_dir).map_err(|source| AcquireError::Project {
        path: project_root.to_path_buf(),
        source,
    })
}
