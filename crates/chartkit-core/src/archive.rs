//! Packaged chart archives
//!
//! A packaged chart is a gzip'd tarball whose entries all live under a
//! single top-level `<name>/` directory.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};

use crate::chart::{CHART_FILE, Chart, ChartFile};
use crate::error::{CoreError, Result};
use crate::save::chart_files;

/// Read every regular file of a chart archive, with the top-level directory stripped
pub fn read_archive_files<R: Read>(reader: R) -> Result<Vec<ChartFile>> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut files = Vec::new();

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        if !matches!(
            entry.header().entry_type(),
            EntryType::Regular | EntryType::Continuous
        ) {
            continue;
        }

        let path = entry.path().map_err(archive_error)?.into_owned();
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            return Err(CoreError::Archive {
                message: format!("chart illegally references parent directory: {}", path.display()),
            });
        }

        let mut parts = path.components().map(|c| c.as_os_str().to_string_lossy());
        let Some(_top) = parts.next() else {
            continue;
        };
        let name = parts.collect::<Vec<_>>().join("/");
        if name.is_empty() {
            if path.as_os_str() == CHART_FILE {
                return Err(CoreError::Archive {
                    message: "Chart.yaml not in base directory".to_string(),
                });
            }
            continue;
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.push(ChartFile::new(name, data));
    }

    if files.is_empty() {
        return Err(CoreError::Archive {
            message: "no files in chart archive".to_string(),
        });
    }

    Ok(files)
}

/// Default archive file name for a chart
#[must_use]
pub fn archive_name(chart: &Chart) -> String {
    format!("{}-{}.tgz", chart.name(), chart.version())
}

/// Package `chart` into `dest_dir/<name>-<version>.tgz`
pub fn package(chart: &Chart, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let output = dest_dir.join(archive_name(chart));

    let file = File::create(&output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for file in chart_files(chart)? {
        add_bytes(&mut builder, &format!("{}/{}", chart.name(), file.name), &file.data)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    tracing::debug!(chart = chart.name(), path = %output.display(), "packaged chart");
    Ok(output)
}

fn add_bytes<W: Write>(builder: &mut Builder<W>, path: &str, content: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();

    builder.append_data(&mut header, path, content)?;
    Ok(())
}

fn archive_error(e: std::io::Error) -> CoreError {
    CoreError::Archive {
        message: e.to_string(),
    }
}
