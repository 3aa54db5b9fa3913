//! Chart reference classification

use std::path::PathBuf;

/// Where a chart reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    /// No reference: scaffold the default chart
    Empty,
    /// An existing file, read as a packaged chart archive
    LocalFile(PathBuf),
    /// An existing directory, read as an unpacked chart
    LocalDirectory(PathBuf),
    /// Anything else: `repo/chart`, a chart name or a URL
    Remote(String),
}

impl ChartSource {
    /// Classify `reference` by looking at the filesystem only
    ///
    /// An existing path always wins, even when the same string would also
    /// name a remote chart.
    pub fn classify(reference: &str) -> Self {
        if reference.is_empty() {
            return Self::Empty;
        }

        match std::fs::metadata(reference) {
            Ok(meta) if meta.is_dir() => Self::LocalDirectory(PathBuf::from(reference)),
            Ok(_) => Self::LocalFile(PathBuf::from(reference)),
            Err(_) => Self::Remote(reference.to_string()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalFile(_) | Self::LocalDirectory(_))
    }
}
