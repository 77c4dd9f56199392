use anyhow::Result;
use log::warn;
use rand::Rng;
use rstest::*;
use std::path::Path;
use std::{path::PathBuf, process::Command};

const TEST_DATA_DIR: &str = "generated-test-data";

pub fn rid() -> String {
    let mut rng = rand::rng();
    let rid: String = (0..10)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect();
    rid
}

pub fn get_rootbox_bin() -> String {
    // Get the original working directory when the tests start
    // This is needed because tests may change directories
    let cargo_manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .unwrap_or_else(|_| {
            // Fallback: try to find the project root by looking for Cargo.toml
            let mut current = std::env::current_dir().unwrap();
            loop {
                if current.join("Cargo.toml").exists() {
                    break current.to_string_lossy().to_string();
                }
                if let Some(parent) = current.parent() {
                    current = parent.to_path_buf();
                } else {
                    panic!("Could not find project root");
                }
            }
        });

    let project_root = Path::new(&cargo_manifest_dir);

    let bin = if let Ok(current_exe) = std::env::current_exe() {
        if current_exe.to_string_lossy().contains("/coverage/") {
            "target/coverage/rootbox"
        } else {
            "target/debug/rootbox"
        }
    } else {
        // Fallback if we can't determine the path
        "target/debug/rootbox"
    };

    let path = project_root.join(bin);
    let absolute_path = path.canonicalize().unwrap_or_else(|_| path.clone());
    println!("Path: {}", absolute_path.to_string_lossy());
    absolute_path.to_string_lossy().to_string()
}

/* Each test gets its own environment root under generated-test-data, and
 * every invocation passes --no-config plus --root so a developer's real
 * ~/.rootbox and config files never leak into a test. */
pub struct EnvManager {
    pub root: PathBuf,
    pub last_stdout: String,
    pub last_stderr: String,
    pub rootbox_bin: String,
    pub no_default_options: bool,
}

impl EnvManager {
    pub fn new() -> Self {
        let root = std::env::current_dir()
            .unwrap()
            .join(TEST_DATA_DIR)
            .join(format!("rootbox-test-{}", rid()));

        #[allow(clippy::panic)]
        match std::fs::create_dir_all(&root) {
            Ok(_) => (),
            Err(e) => {
                panic!("Failed to create {} dir: {}", root.display(), e);
            }
        }

        Self {
            root,
            last_stdout: String::new(),
            last_stderr: String::new(),
            rootbox_bin: get_rootbox_bin(),
            no_default_options: false,
        }
    }

    pub fn run(&mut self, args: &[&str]) -> Result<std::process::Output> {
        self.run_with_env(args, "", "")
    }

    #[allow(dead_code)]
    pub fn run_with_stdin(
        &mut self,
        args: &[&str],
        stdin_input: &str,
    ) -> Result<std::process::Output> {
        use std::io::Write;
        use std::process::Stdio;

        let mut cmd = Command::new(&self.rootbox_bin);
        self.apply_default_options(&mut cmd, args);
        cmd.args(args);

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        println!(
            "Running command with stdin: {} {}",
            cmd.get_program().to_string_lossy(),
            cmd.get_args()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn command: {:?}", e))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(stdin_input.as_bytes()).map_err(|e| {
                anyhow::anyhow!("Failed to write to stdin: {:?}", e)
            })?;
        }

        let output = child.wait_with_output().map_err(|e| {
            anyhow::anyhow!("Failed to wait for command: {:?}", e)
        })?;

        self.record_output(&output)?;
        Ok(output)
    }

    pub fn run_with_env(
        &mut self,
        args: &[&str],
        env_key: &str,
        env_value: &str,
    ) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.rootbox_bin);
        if !env_key.is_empty() {
            println!("Setting env var: {}={}", env_key, env_value);
            cmd.env(env_key, env_value);
        }
        self.apply_default_options(&mut cmd, args);
        cmd.args(args);
        println!(
            "Running command: {} {}",
            cmd.get_program().to_string_lossy(),
            cmd.get_args()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        match cmd.output() {
            Ok(output) => {
                self.record_output(&output)?;
                Ok(output)
            }
            Err(e) => Err(anyhow::anyhow!("Command failed: {:?}", e)),
        }
    }

    fn apply_default_options(&self, cmd: &mut Command, args: &[&str]) {
        if self.no_default_options {
            return;
        }
        cmd.arg("--no-config");
        if !args.iter().any(|arg| arg.starts_with("--root")) {
            cmd.arg(format!("--root={}", self.root.display()));
        }
    }

    fn record_output(&mut self, output: &std::process::Output) -> Result<()> {
        self.last_stdout = String::from_utf8_lossy(&output.stdout).to_string();
        self.last_stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if let Some(code) = output.status.code() {
            if code != 0 {
                return Err(anyhow::anyhow!(
                    "Command returned non-zero exit code: {}\nstdout: {}\nstderr: {}",
                    code,
                    self.last_stdout,
                    self.last_stderr
                ));
            }
        } else {
            return Err(anyhow::anyhow!(
                "Command did not return a valid exit code\nstdout: {}\nstderr: {}",
                self.last_stdout,
                self.last_stderr
            ));
        }
        Ok(())
    }

    #[allow(dead_code)]
    pub fn pass(&mut self, args: &[&str]) -> bool {
        if let Ok(output) = self.run(args) {
            return output.status.code().unwrap() == 0;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    #[allow(dead_code)]
    pub fn xfail(&mut self, args: &[&str]) -> bool {
        if let Ok(output) = self.run(args) {
            return output.status.code().unwrap() != 0;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        true
    }

    /// Lays down the on-disk markers of a completed install without
    /// downloading anything.
    #[allow(dead_code)]
    pub fn fake_install(&self) -> Result<()> {
        let rootfs = self.root.join("rootfs");
        std::fs::create_dir_all(rootfs.join("bin"))?;
        std::fs::write(rootfs.join("bin/sh"), b"#!/bin/sh\n")?;
        let init = rootfs.join("usr/local/bin/rootbox-init");
        std::fs::create_dir_all(init.parent().unwrap())?;
        std::fs::write(&init, b"#!/bin/sh\nexec \"$@\"\n")?;
        Ok(())
    }
}

impl Drop for EnvManager {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {} dir: {}", self.root.display(), e);
            }
        }
    }
}

#[fixture]
pub fn env() -> EnvManager {
    EnvManager::new()
}
