use anyhow::{Context, Result};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tar::EntryType;

/* The destination filesystem cannot represent everything a Linux rootfs
 * tarball contains. Device nodes are skipped, hardlinks are emulated by
 * content copy (proot's --link2symlink handles links created later from
 * inside the environment), and symlinks that the filesystem rejects fall
 * back to a sentinel file the proot layer can reinterpret. */

/// Prefix written to a plain file standing in for a symlink the filesystem
/// refused to create. The remainder of the file is the intended target path.
pub const SYMLINK_SENTINEL: &str = "!<symlink>";

// Progress heuristic: the compressed stream does not expose a total entry
// count up front, so progress is estimated from entries processed at an
// assumed average cost against the expanded source size, capped below 100%
// until the pass completes.
const AVG_ENTRY_BYTES: u64 = 32 * 1024;
const EXPANSION_FACTOR: u64 = 3;
const PROGRESS_CAP: f32 = 0.95;

/// Recreates a tar entry stream under `target`. `source_size` is the size of
/// the compressed source, used only for the progress estimate.
pub fn materialize<R: Read>(
    archive: &mut tar::Archive<R>,
    target: &Path,
    source_size: u64,
    on_progress: &mut dyn FnMut(f32),
) -> Result<()> {
    let estimated_total = (source_size * EXPANSION_FACTOR).max(1);
    let mut hardlinks: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut processed: u64 = 0;

    for entry in archive.entries().context("Failed to open tar stream")? {
        let mut entry = entry.context("Failed to read tar entry")?;
        let Some(rel) = normalize_entry_path(&entry.path()?) else {
            warn!(
                "Skipping tar entry with unsafe path: {}",
                entry.path()?.display()
            );
            continue;
        };
        let dest = target.join(&rel);
        let kind = entry.header().entry_type();

        match kind {
            EntryType::Char | EntryType::Block => {
                debug!("Skipping device node: {}", rel.display());
            }
            EntryType::Directory => {
                fs::create_dir_all(&dest).context(format!(
                    "Failed to create directory {}",
                    dest.display()
                ))?;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .context("Failed to read symlink target")?
                    .context(format!(
                        "Symlink entry {} has no target",
                        rel.display()
                    ))?
                    .into_owned();
                write_symlink(&dest, &link, &rel)?;
            }
            EntryType::Link => {
                let link = entry
                    .link_name()
                    .context("Failed to read hardlink target")?
                    .context(format!(
                        "Hardlink entry {} has no target",
                        rel.display()
                    ))?
                    .into_owned();
                copy_hardlink(&hardlinks, target, &dest, &link, &rel)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                write_regular(&mut entry, &dest, &rel)?;
                hardlinks.insert(rel.clone(), dest.clone());
            }
            other => {
                trace!(
                    "Ignoring tar entry kind {:?}: {}",
                    other,
                    rel.display()
                );
            }
        }

        processed += 1;
        let fraction = ((processed * AVG_ENTRY_BYTES) as f32
            / estimated_total as f32)
            .min(PROGRESS_CAP);
        on_progress(fraction);
    }

    on_progress(1.0);
    Ok(())
}

/// Streams entries until one regular file satisfies `matches`, copies it to
/// `dest` marked executable, and reports whether a match was found.
pub fn extract_single_file<R: Read>(
    archive: &mut tar::Archive<R>,
    matches: impl Fn(&Path) -> bool,
    dest: &Path,
) -> Result<bool> {
    for entry in archive.entries().context("Failed to open tar stream")? {
        let mut entry = entry.context("Failed to read tar entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let Some(rel) = normalize_entry_path(&entry.path()?) else {
            continue;
        };
        if !matches(&rel) {
            continue;
        }

        trace!("Extracting {} to {}", rel.display(), dest.display());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).context(format!(
                "Failed to create directory {}",
                parent.display()
            ))?;
        }
        let mut out = fs::File::create(dest).context(format!(
            "Failed to create {}",
            dest.display()
        ))?;
        std::io::copy(&mut entry, &mut out).context(format!(
            "Failed to write {}",
            dest.display()
        ))?;
        drop(out);
        fs::set_permissions(dest, fs::Permissions::from_mode(0o755))
            .context(format!("Failed to chmod {}", dest.display()))?;
        return Ok(true);
    }
    Ok(false)
}

/* Strips leading ./ components and rejects anything containing .. or an
 * absolute component, so a hostile tarball cannot write outside the target
 * root. */
fn normalize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return None;
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn write_symlink(dest: &Path, link: &Path, rel: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create directory {}",
            parent.display()
        ))?;
    }
    // tar streams may re-deliver a path; replace rather than fail
    if dest.symlink_metadata().is_ok() {
        let _ = fs::remove_file(dest);
    }
    match std::os::unix::fs::symlink(link, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                "symlink {} -> {} rejected ({}), writing sentinel file",
                rel.display(),
                link.display(),
                e
            );
            fs::write(dest, format!("{}{}", SYMLINK_SENTINEL, link.display()))
                .context(format!(
                    "Failed to write symlink sentinel {}",
                    dest.display()
                ))
        }
    }
}

fn copy_hardlink(
    hardlinks: &HashMap<PathBuf, PathBuf>,
    target: &Path,
    dest: &Path,
    link: &Path,
    rel: &Path,
) -> Result<()> {
    let link_key = normalize_entry_path(link);
    let source = link_key
        .as_ref()
        .and_then(|key| hardlinks.get(key).cloned())
        .or_else(|| {
            let candidate = target.join(link_key.as_deref().unwrap_or(link));
            candidate.is_file().then_some(candidate)
        });

    let Some(source) = source else {
        warn!(
            "Hardlink {} -> {}: target not materialized, skipping",
            rel.display(),
            link.display()
        );
        return Ok(());
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create directory {}",
            parent.display()
        ))?;
    }
    fs::copy(&source, dest).context(format!(
        "Failed to copy hardlink content {} -> {}",
        source.display(),
        dest.display()
    ))?;
    Ok(())
}

fn write_regular<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    dest: &Path,
    rel: &Path,
) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create directory {}",
            parent.display()
        ))?;
    }
    let mut out = fs::File::create(dest).context(format!(
        "Failed to create {}",
        dest.display()
    ))?;
    std::io::copy(entry, &mut out)
        .context(format!("Failed to write {}", rel.display()))?;
    drop(out);

    let mode = entry.header().mode().unwrap_or(0o644);
    let perms = if mode & 0o111 != 0 { 0o755 } else { 0o644 };
    fs::set_permissions(dest, fs::Permissions::from_mode(perms))
        .context(format!("Failed to chmod {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(tag: &str) -> PathBuf {
        PathBuf::from(format!(
            "/tmp/rootbox-tests-materialize-{}-{}",
            tag,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn file_entry(
        builder: &mut tar::Builder<Vec<u8>>,
        path: &str,
        content: &[u8],
        mode: u32,
    ) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, path, content).unwrap();
    }

    fn link_entry(
        builder: &mut tar::Builder<Vec<u8>>,
        kind: EntryType,
        path: &str,
        target: &str,
    ) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(kind);
        header.set_size(0);
        header.set_mode(0o644);
        builder.append_link(&mut header, path, target).unwrap();
    }

    fn device_entry(builder: &mut tar::Builder<Vec<u8>>, path: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Char);
        header.set_size(0);
        header.set_mode(0o644);
        header.set_device_major(1).unwrap();
        header.set_device_minor(3).unwrap();
        header.set_cksum();
        builder.append_data(&mut header, path, &[][..]).unwrap();
    }

    fn run_materialize(tar_bytes: Vec<u8>, target: &Path) -> Result<Vec<f32>> {
        let mut progress = Vec::new();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        materialize(&mut archive, target, tar_bytes.len() as u64, &mut |f| {
            progress.push(f)
        })?;
        Ok(progress)
    }

    #[test]
    fn test_hardlink_in_order_copies_content() {
        let dir = test_dir("hardlink");
        let mut builder = tar::Builder::new(Vec::new());
        file_entry(&mut builder, "a.txt", b"shared bytes", 0o644);
        link_entry(&mut builder, EntryType::Link, "b.txt", "a.txt");
        let bytes = builder.into_inner().unwrap();

        run_materialize(bytes, &dir).unwrap();

        assert_eq!(fs::read(dir.join("a.txt")).unwrap(), b"shared bytes");
        assert_eq!(fs::read(dir.join("b.txt")).unwrap(), b"shared bytes");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_hardlink_out_of_order_skipped() {
        let dir = test_dir("hardlink-ooo");
        let mut builder = tar::Builder::new(Vec::new());
        link_entry(&mut builder, EntryType::Link, "b.txt", "a.txt");
        file_entry(&mut builder, "a.txt", b"late", 0o644);
        let bytes = builder.into_inner().unwrap();

        run_materialize(bytes, &dir).unwrap();

        assert!(!dir.join("b.txt").exists());
        assert_eq!(fs::read(dir.join("a.txt")).unwrap(), b"late");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_device_entries_skipped() {
        let dir = test_dir("device");
        let mut builder = tar::Builder::new(Vec::new());
        device_entry(&mut builder, "dev/null");
        file_entry(&mut builder, "after.txt", b"still here", 0o644);
        let bytes = builder.into_inner().unwrap();

        run_materialize(bytes, &dir).unwrap();

        assert!(!dir.join("dev/null").exists());
        assert_eq!(fs::read(dir.join("after.txt")).unwrap(), b"still here");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_symlink_created() {
        let dir = test_dir("symlink");
        let mut builder = tar::Builder::new(Vec::new());
        file_entry(&mut builder, "bin/sh", b"#!", 0o755);
        link_entry(&mut builder, EntryType::Symlink, "bin/bash", "sh");
        let bytes = builder.into_inner().unwrap();

        run_materialize(bytes, &dir).unwrap();

        let target = fs::read_link(dir.join("bin/bash")).unwrap();
        assert_eq!(target, PathBuf::from("sh"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_execute_bit_applied() {
        let dir = test_dir("exec");
        let mut builder = tar::Builder::new(Vec::new());
        file_entry(&mut builder, "bin/tool", b"#!/bin/sh\n", 0o755);
        file_entry(&mut builder, "etc/conf", b"k=v\n", 0o644);
        let bytes = builder.into_inner().unwrap();

        run_materialize(bytes, &dir).unwrap();

        let tool = fs::metadata(dir.join("bin/tool")).unwrap();
        assert_eq!(tool.permissions().mode() & 0o111, 0o111);
        let conf = fs::metadata(dir.join("etc/conf")).unwrap();
        assert_eq!(conf.permissions().mode() & 0o111, 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_progress_capped_then_snapped() {
        let dir = test_dir("progress");
        let mut builder = tar::Builder::new(Vec::new());
        for i in 0..20 {
            file_entry(&mut builder, &format!("f{}", i), b"x", 0o644);
        }
        let bytes = builder.into_inner().unwrap();

        let progress = run_materialize(bytes, &dir).unwrap();

        assert_eq!(*progress.last().unwrap(), 1.0);
        for fraction in &progress[..progress.len() - 1] {
            assert!(*fraction <= PROGRESS_CAP);
        }
        // monotonically non-decreasing
        for pair in progress.windows(2) {
            assert!(pair[0] <= pair[1]);
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_normalize_entry_path() {
        assert_eq!(
            normalize_entry_path(Path::new("./usr/bin/env")),
            Some(PathBuf::from("usr/bin/env"))
        );
        assert_eq!(normalize_entry_path(Path::new("../escape.txt")), None);
        assert_eq!(normalize_entry_path(Path::new("a/../../b")), None);
        assert_eq!(normalize_entry_path(Path::new("/etc/passwd")), None);
        assert_eq!(normalize_entry_path(Path::new("./")), None);
    }

    #[test]
    fn test_extract_single_file() {
        let dir = test_dir("single");
        fs::create_dir_all(&dir).unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        file_entry(&mut builder, "./usr/share/doc/README", b"docs", 0o644);
        file_entry(&mut builder, "./usr/bin/proot", b"\x7fELF", 0o755);
        let bytes = builder.into_inner().unwrap();

        let dest = dir.join("proot");
        let mut archive = tar::Archive::new(bytes.as_slice());
        let found = extract_single_file(
            &mut archive,
            |p| p.ends_with("bin/proot"),
            &dest,
        )
        .unwrap();

        assert!(found);
        assert_eq!(fs::read(&dest).unwrap(), b"\x7fELF");
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_extract_single_file_not_found() {
        let dir = test_dir("single-miss");
        fs::create_dir_all(&dir).unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        file_entry(&mut builder, "usr/share/doc/README", b"docs", 0o644);
        let bytes = builder.into_inner().unwrap();

        let dest = dir.join("proot");
        let mut archive = tar::Archive::new(bytes.as_slice());
        let found = extract_single_file(
            &mut archive,
            |p| p.ends_with("bin/proot"),
            &dest,
        )
        .unwrap();

        assert!(!found);
        assert!(!dest.exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
