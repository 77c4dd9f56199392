use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

const CHUNK_SIZE: usize = 8 * 1024;

/// Streams `url` to `dest`, reporting fractional progress in `[0, 1]` after
/// each chunk when the server declares a content length, otherwise only at
/// completion.
///
/// If `dest` already exists the download is skipped entirely and progress
/// `1.0` is reported immediately. The pre-existing file is NOT verified
/// against the remote resource, so a partial file left behind by an aborted
/// transfer will be treated as complete; callers that need stronger
/// guarantees must delete the destination first.
pub fn fetch(
    url: &str,
    dest: &Path,
    on_progress: &mut dyn FnMut(f32),
) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create download directory {}",
            parent.display()
        ))?;
    }

    if dest.exists() {
        info!("{} already present, skipping download", dest.display());
        on_progress(1.0);
        return Ok(());
    }

    info!("Downloading {} to {}", url, dest.display());
    let mut response = reqwest::blocking::get(url)
        .context(format!("Failed to connect to {}", url))?
        .error_for_status()
        .context(format!("Server rejected request for {}", url))?;

    let total = response.content_length().unwrap_or(0);
    if total == 0 {
        debug!("No content length for {}, progress will be coarse", url);
    }

    let mut out = fs::File::create(dest)
        .context(format!("Failed to create {}", dest.display()))?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut received: u64 = 0;

    loop {
        let n = response
            .read(&mut buf)
            .context(format!("Failed reading response body from {}", url))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .context(format!("Failed writing to {}", dest.display()))?;
        received += n as u64;
        if total > 0 {
            on_progress((received as f32 / total as f32).min(1.0));
        }
    }
    out.flush()
        .context(format!("Failed flushing {}", dest.display()))?;

    debug!("Downloaded {} bytes from {}", received, url);
    on_progress(1.0);
    Ok(())
}
