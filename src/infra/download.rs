// ============================================================
// Layer 6 — Dataset Download
// ============================================================
// Makes a named dataset available locally and returns its paths.
//
//   <root>/<name>/db.csv
//   <root>/<name>/ymls/client.yml
//   <root>/<name>/vols/...
//
// If the template is already present nothing is fetched. If not,
// `<base_url>/<name>.tar.gz` is downloaded, gunzipped, and
// unpacked into <root>/<name>. The archive is expected to hold
// the dataset files at its top level.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use crate::domain::error::TrainError;

pub const ENV_DATA_URL: &str = "MEDVOL_DATA_URL";

const TEMPLATE: &str = "ymls/client.yml";
const INDEX:    &str = "db.csv";

/// Local locations of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPaths {
    pub root:            PathBuf,
    pub db:              PathBuf,
    pub client_template: PathBuf,
}

impl DatasetPaths {
    pub fn under(root: &Path, name: &str) -> Self {
        let root = root.join(name);
        Self {
            db:              root.join(INDEX),
            client_template: root.join(TEMPLATE),
            root,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.db.exists() && self.client_template.exists()
    }
}

pub struct DatasetFetcher {
    root:     PathBuf,
    base_url: Option<String>,
}

impl DatasetFetcher {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        let base_url = base_url.or_else(|| std::env::var(ENV_DATA_URL).ok());
        Self { root: root.into(), base_url }
    }

    /// Return local paths, downloading the archive first if needed.
    pub fn fetch(&self, name: &str) -> Result<DatasetPaths> {
        let paths = DatasetPaths::under(&self.root, name);
        if paths.is_complete() {
            tracing::info!("Dataset '{}' already present at '{}'", name, paths.root.display());
            return Ok(paths);
        }

        let Some(base_url) = &self.base_url else {
            tracing::warn!("No local copy of '{}' and no {} set", name, ENV_DATA_URL);
            return Err(TrainError::ResourceNotFound(paths.client_template).into());
        };

        let url = format!("{}/{name}.tar.gz", base_url.trim_end_matches('/'));
        tracing::info!("Downloading '{}'", url);
        let response = open_stream(&url)?;
        if let Some(len) = response.content_length() {
            tracing::info!("Archive size {:.1} MiB", len as f64 / (1024.0 * 1024.0));
        }

        // Unpacked while it arrives; the archive is never held in memory
        let mut stream = CountingReader::new(response);
        unpack_tar_gz(&mut stream, &paths.root)?;
        tracing::info!("Unpacked {:.1} MiB", stream.count() as f64 / (1024.0 * 1024.0));

        if !paths.is_complete() {
            return Err(TrainError::ResourceNotFound(paths.client_template).into());
        }
        Ok(paths)
    }
}

fn open_stream(url: &str) -> Result<reqwest::blocking::Response> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30 * 60))
        .build()?;

    client
        .get(url)
        .send()
        .with_context(|| format!("Request to '{url}' failed"))?
        .error_for_status()
        .with_context(|| format!("Server rejected '{url}'"))
}

/// Passes reads through and counts the bytes.
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Unpack a gzipped tarball into `dest` (created if missing).
pub fn unpack_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Cannot create '{}'", dest.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive
        .unpack(dest)
        .with_context(|| format!("Cannot unpack archive into '{}'", dest.display()))?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (name, body) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_existing_dataset_is_not_downloaded() {
        let dir   = tempfile::tempdir().unwrap();
        let paths = DatasetPaths::under(dir.path(), "xr");
        fs::create_dir_all(paths.client_template.parent().unwrap()).unwrap();
        fs::write(&paths.db, "sid,fname,fold,label\n").unwrap();
        fs::write(&paths.client_template, "root: ..\n").unwrap();

        // An unreachable URL proves nothing was fetched
        let fetcher = DatasetFetcher::new(dir.path(), Some("http://127.0.0.1:9".into()));
        assert_eq!(fetcher.fetch("xr").unwrap(), paths);
    }

    #[test]
    fn test_missing_dataset_without_url() {
        let dir     = tempfile::tempdir().unwrap();
        let fetcher = DatasetFetcher { root: dir.path().to_path_buf(), base_url: None };
        let err     = fetcher.fetch("xr").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::ResourceNotFound(_))
        ));
    }

    /// Hands out at most 7 bytes per read, like a slow socket.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(7).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_unpack_from_incremental_stream() {
        let dir  = tempfile::tempdir().unwrap();
        let dest = dir.path().join("xr");
        let gz   = tarball(&[("db.csv", "sid,fname,fold,label\n"), ("ymls/client.yml", "root: ..\n")]);

        let mut stream = CountingReader::new(Trickle(&gz));
        unpack_tar_gz(&mut stream, &dest).unwrap();
        assert!(DatasetPaths::under(dir.path(), "xr").is_complete());
        assert_eq!(
            fs::read_to_string(dest.join("ymls/client.yml")).unwrap(),
            "root: ..\n"
        );
        assert!(stream.count() > 0);
        assert!(stream.count() <= gz.len() as u64);
    }

    #[test]
    fn test_unpack_layout() {
        let dir  = tempfile::tempdir().unwrap();
        let dest = dir.path().join("xr");
        let gz   = tarball(&[("db.csv", "sid,fname,fold,label\n"), ("ymls/client.yml", "root: ..\n")]);
        unpack_tar_gz(&gz[..], &dest).unwrap();
        assert!(DatasetPaths::under(dir.path(), "xr").is_complete());
    }
}
