use std::{
    fs::create_dir_all,
    io::Read,
    path::{Path, PathBuf},
};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{PlanetoidError, Result};

pub struct RemoteFile {
    response: reqwest::blocking::Response,
    current_size: u64,
    pbar: Option<ProgressBar>,
}
impl RemoteFile {
    pub fn with_pbar(url: &str) -> Result<Self> {
        Self::with_config(url, 3600, true)
    }
    /// Sends the GET; HTTP error statuses fail here rather than while reading.
    pub fn with_config(url: &str, timeout: u64, pbar: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::new();
        let response = client
            .get(url)
            .timeout(std::time::Duration::from_secs(timeout))
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|source| PlanetoidError::Download {
                url: url.to_owned(),
                source,
            })?;

        let pbar = pbar.then(|| {
            let pbar = match response.content_length() {
                Some(total_size) => ProgressBar::new(total_size),
                None => ProgressBar::new_spinner(),
            };
            let style = ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pbar.set_style(style);
            pbar.set_message(format!("Downloading {}", url));
            pbar
        });
        Ok(Self {
            response,
            current_size: 0,
            pbar,
        })
    }
    fn update(&mut self, size: usize) {
        self.current_size += size as u64;
        if let Some(pbar) = &self.pbar {
            if size == 0 {
                pbar.finish_and_clear();
            } else {
                pbar.set_position(self.current_size);
            }
        }
    }
}

impl Read for RemoteFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.response.read(buf)?;
        self.update(size);
        Ok(size)
    }
}

/// Downloads `url` into `folder` under its last path segment. The body goes to a
/// temporary file first, so a failed transfer leaves no partial file behind.
pub fn download_url<P: AsRef<Path>>(url: &str, folder: P) -> Result<PathBuf> {
    let folder = folder.as_ref();
    let filename = url.rsplit('/').next().unwrap_or(url);
    let path = folder.join(filename);
    create_dir_all(folder)?;

    let mut remote_file = RemoteFile::with_pbar(url)?;
    let mut local_file = tempfile::NamedTempFile::new_in(folder)?;
    std::io::copy(&mut remote_file, &mut local_file)?;
    local_file.persist(&path).map_err(|e| e.error)?;
    Ok(path)
}
