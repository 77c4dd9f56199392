use super::{resolve_loader, resolve_proot};
use crate::env::Env;
use anyhow::{Context, Result};
use log::{trace, warn};
use std::fs;
use std::io::{BufRead, BufReader};
use std::os::fd::OwnedFd;
use std::process::{Command, Stdio};

/* Everything in this file is external-contract territory: the flag order and
 * the environment variable names are what the proot binary's own parser
 * expects and must not be reworded. */

// PROOT_NO_SECCOMP is set unconditionally: standard seccomp policies
// misbehave under ptrace-based tracing on recent mobile kernels.
pub const PROOT_NO_SECCOMP_VAR: &str = "PROOT_NO_SECCOMP";
pub const PROOT_LOADER_VAR: &str = "PROOT_LOADER";
pub const PROOT_TMP_DIR_VAR: &str = "PROOT_TMP_DIR";

const SYSTEM_PATH_DIRS: &str =
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Exit code reported when the proot binary cannot be resolved or the child
/// is terminated by a signal.
pub const EXIT_UNAVAILABLE: i32 = -1;

/// Argument vector for one proot invocation, in the exact order the proot
/// CLI expects: fake-root mapping, hardlink-to-symlink translation, rootfs
/// root, kernel pseudo-fs and data bind mounts, working directory, then the
/// shell command.
pub fn build_args(env: &Env, command: &str, user: &str) -> Vec<String> {
    let workdir = if user == "root" {
        "/root".to_string()
    } else {
        format!("/home/{}", user)
    };

    vec![
        "-0".to_string(),
        "--link2symlink".to_string(),
        "-r".to_string(),
        env.rootfs_dir.to_string_lossy().to_string(),
        "-b".to_string(),
        "/dev".to_string(),
        "-b".to_string(),
        "/proc".to_string(),
        "-b".to_string(),
        "/sys".to_string(),
        "-b".to_string(),
        format!("{}:/android/data", env.data_dir.display()),
        "-w".to_string(),
        workdir,
        "/bin/sh".to_string(),
        "-c".to_string(),
        command.to_string(),
    ]
}

/// Environment for one proot invocation: loader override when one resolves,
/// seccomp disabled, private tmp dir, system bin dirs on PATH, and the
/// bundled-binaries directory on the library search path so proot can find
/// its own shared dependencies.
pub fn build_env_vars(env: &Env) -> Vec<(String, String)> {
    let mut vars = Vec::new();

    if let Some(loader) = resolve_loader(env) {
        vars.push((
            PROOT_LOADER_VAR.to_string(),
            loader.to_string_lossy().to_string(),
        ));
    }
    vars.push((PROOT_NO_SECCOMP_VAR.to_string(), "1".to_string()));
    vars.push((
        PROOT_TMP_DIR_VAR.to_string(),
        env.tmp_dir.to_string_lossy().to_string(),
    ));

    let path = match std::env::var("PATH") {
        Ok(existing) if !existing.is_empty() => {
            format!("{}:{}", existing, SYSTEM_PATH_DIRS)
        }
        _ => SYSTEM_PATH_DIRS.to_string(),
    };
    vars.push(("PATH".to_string(), path));
    vars.push((
        "LD_LIBRARY_PATH".to_string(),
        env.bundled_dir.to_string_lossy().to_string(),
    ));

    vars
}

/// Runs `command` through `/bin/sh -c` inside the environment, invoking
/// `on_line` for every line of combined stdout/stderr as it arrives, and
/// blocks until the process exits. Returns the exit code, or
/// `EXIT_UNAVAILABLE` when no proot binary resolves or the child dies to a
/// signal. No timeout is enforced.
pub fn run(
    env: &Env,
    command: &str,
    user: &str,
    on_line: &mut dyn FnMut(&str),
) -> Result<i32> {
    let Some(proot) = resolve_proot(env) else {
        warn!("No proot binary found; is the environment installed?");
        return Ok(EXIT_UNAVAILABLE);
    };

    fs::create_dir_all(&env.tmp_dir).context(format!(
        "Failed to create proot tmp dir {}",
        env.tmp_dir.display()
    ))?;
    fs::create_dir_all(&env.data_dir).context(format!(
        "Failed to create data dir {}",
        env.data_dir.display()
    ))?;

    let args = build_args(env, command, user);
    trace!("proot invocation: {} {}", proot.display(), args.join(" "));

    // stdout and stderr share one pipe so output arrives in one line stream
    let (read_fd, write_fd): (OwnedFd, OwnedFd) =
        nix::unistd::pipe().context("Failed to create output pipe")?;
    let write_fd_stderr = write_fd
        .try_clone()
        .context("Failed to clone output pipe")?;

    let mut cmd = Command::new(&proot);
    cmd.args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::from(write_fd))
        .stderr(Stdio::from(write_fd_stderr));
    for (key, value) in build_env_vars(env) {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .context(format!("Failed to spawn {}", proot.display()))?;
    // Drop our copies of the write end or the read loop never sees EOF
    drop(cmd);

    let reader = BufReader::new(std::fs::File::from(read_fd));
    for line in reader.lines() {
        let line = line.context("Failed to read sandbox output")?;
        on_line(&line);
    }

    let status = child.wait().context("Failed to wait for proot")?;
    Ok(status.code().unwrap_or(EXIT_UNAVAILABLE))
}
