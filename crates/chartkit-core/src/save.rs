//! Writing a chart back to disk

use std::path::{Path, PathBuf};

use crate::chart::{CHART_FILE, CHARTS_DIR, Chart, ChartFile};
use crate::error::{CoreError, Result};

/// Write `chart` as an unpacked directory `dest/<name>/`
///
/// Sub-charts are written as directories under `charts/`. Returns the chart
/// directory.
pub fn save_dir(chart: &Chart, dest: &Path) -> Result<PathBuf> {
    let outdir = dest.join(chart.name());
    if outdir.exists() && !outdir.is_dir() {
        return Err(CoreError::invalid(format!(
            "file {} already exists and is not a directory",
            outdir.display()
        )));
    }
    std::fs::create_dir_all(&outdir)?;

    for file in chart_files(chart)? {
        let path = outdir.join(&file.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &file.data)?;
    }

    tracing::debug!(chart = chart.name(), path = %outdir.display(), "saved chart");
    Ok(outdir)
}

/// Flatten a chart into its files, nesting sub-charts under `charts/<name>/`
pub(crate) fn chart_files(chart: &Chart) -> Result<Vec<ChartFile>> {
    let mut files = vec![ChartFile::new(
        CHART_FILE,
        serde_yaml::to_string(&chart.metadata)?,
    )];

    if let Some(lock) = &chart.lock {
        files.push(ChartFile::new(
            chart.lock_file_name(),
            serde_yaml::to_string(lock)?,
        ));
    }
    files.extend(chart.values.iter().cloned());
    files.extend(chart.schema.iter().cloned());
    files.extend(chart.templates.iter().cloned());
    files.extend(chart.files.iter().cloned());

    for dep in &chart.dependencies {
        let prefix = format!("{}/{}", CHARTS_DIR, dep.name());
        for file in chart_files(dep)? {
            files.push(ChartFile::new(format!("{}/{}", prefix, file.name), file.data));
        }
    }

    Ok(files)
}
