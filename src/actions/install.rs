use crate::archive::{extract_single_file, materialize, reader_for, seek_data_member};
use crate::config::Config;
use crate::env::{Env, INIT_SCRIPT};
use crate::fetch::fetch;
use crate::outln;
use crate::proot::{LOADER_BIN, PROOT_BIN};
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::fs;
use std::io::{BufReader, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/* Install runs the provisioning phases in order: rootfs download ->
 * extraction -> readiness gate, then proot .deb download -> ar seek ->
 * binary extraction. Each phase is skipped when its on-disk result already
 * exists, so a failed run can be retried without redoing finished work. */
pub fn install(config: &Config) -> Result<()> {
    let env = Env::from_config(config);
    fs::create_dir_all(&env.root).context(format!(
        "Failed to create environment root {}",
        env.root.display()
    ))?;

    if env.rootfs_ready() {
        info!("Rootfs already extracted at {}", env.rootfs_dir.display());
    } else {
        install_rootfs(&env, &config.rootfs_url)?;
    }

    if env.vendor_dir.join(PROOT_BIN).is_file() {
        info!("proot already extracted at {}", env.vendor_dir.display());
    } else {
        install_proot(&env, &config.proot_url)?;
    }
    if !env.proot_available() {
        bail!("proot extraction finished but no binary resolves");
    }

    write_init_script(&env)?;

    outln!("Environment ready at {}", env.root.display());
    Ok(())
}

fn install_rootfs(env: &Env, url: &str) -> Result<()> {
    let name = remote_file_name(url, "rootfs.tar.gz");
    let archive_path = env.downloads_dir.join(&name);

    fetch(url, &archive_path, &mut phase_progress("rootfs download"))?;

    info!("Extracting rootfs to {}", env.rootfs_dir.display());
    let source_size = fs::metadata(&archive_path)
        .context(format!("Failed to stat {}", archive_path.display()))?
        .len();
    let file = fs::File::open(&archive_path).context(format!(
        "Failed to open {}",
        archive_path.display()
    ))?;
    let reader = reader_for(&name, BufReader::new(file))?;
    let mut archive = tar::Archive::new(reader);
    materialize(
        &mut archive,
        &env.rootfs_dir,
        source_size,
        &mut phase_progress("rootfs extract"),
    )?;

    // Readiness gate: the source archive is only cleaned up on success, so a
    // failed extraction can be retried without re-downloading.
    if !env.rootfs_ready() {
        bail!(
            "Rootfs extraction finished but {}/bin is missing or empty",
            env.rootfs_dir.display()
        );
    }
    fs::remove_file(&archive_path).context(format!(
        "Failed to remove {}",
        archive_path.display()
    ))?;
    info!("Rootfs ready at {}", env.rootfs_dir.display());
    Ok(())
}

fn install_proot(env: &Env, url: &str) -> Result<()> {
    let name = remote_file_name(url, "proot.deb");
    let deb_path = env.downloads_dir.join(&name);

    fetch(url, &deb_path, &mut phase_progress("proot download"))?;

    info!("Extracting proot from {}", deb_path.display());
    let proot_dest = env.vendor_dir.join(PROOT_BIN);
    let found = extract_deb_file(&deb_path, "bin/proot", &proot_dest)?;
    if !found {
        bail!("No proot binary found in {}", deb_path.display());
    }

    // The loader is a paired helper; some proot builds inline it
    let loader_dest = env.vendor_dir.join(LOADER_BIN);
    let found = extract_deb_file(&deb_path, LOADER_BIN, &loader_dest)?;
    if !found {
        warn!("No loader found in {}, relying on proot's built-in", name);
    }

    fs::remove_file(&deb_path)
        .context(format!("Failed to remove {}", deb_path.display()))?;
    info!("proot ready at {}", proot_dest.display());
    Ok(())
}

/* One narrow pass over the .deb per wanted file: seek the ar stream to the
 * data.tar member, stack the right decompressor on it, and pull the first
 * regular file whose path ends with `suffix`. */
fn extract_deb_file(deb: &Path, suffix: &str, dest: &Path) -> Result<bool> {
    let file = fs::File::open(deb)
        .context(format!("Failed to open {}", deb.display()))?;
    let mut reader = BufReader::new(file);

    let member = seek_data_member(&mut reader)?;
    debug!("Found {} ({} bytes) in {}", member.name, member.size, deb.display());

    let payload = reader.take(member.size);
    let decompressed = reader_for(&member.name, payload)?;
    let mut archive = tar::Archive::new(decompressed);

    let suffix_path = Path::new(suffix);
    extract_single_file(&mut archive, |p| p.ends_with(suffix_path), dest)
}

fn write_init_script(env: &Env) -> Result<()> {
    let script = env.rootfs_dir.join(INIT_SCRIPT);
    if let Some(parent) = script.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create directory {}",
            parent.display()
        ))?;
    }
    fs::write(
        &script,
        "#!/bin/sh\n\
         # Written by rootbox at install time.\n\
         export PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin\n\
         exec \"$@\"\n",
    )
    .context(format!("Failed to write {}", script.display()))?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
        .context(format!("Failed to chmod {}", script.display()))?;
    debug!("Wrote init script {}", script.display());
    Ok(())
}

fn remote_file_name(url: &str, fallback: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/* Progress lands in the log rather than a UI: report at most once per
 * decile so a long extraction doesn't flood the output. */
fn phase_progress(label: &'static str) -> impl FnMut(f32) {
    let mut last_decile = -1i32;
    move |fraction: f32| {
        let decile = (fraction * 10.0) as i32;
        if decile > last_decile {
            last_decile = decile;
            info!("{}: {:.0}%", label, fraction * 100.0);
        }
    }
}
