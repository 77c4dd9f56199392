use super::cli::Args;
use super::{Config, DEFAULT_PROOT_URL, DEFAULT_ROOTFS_URL, PartialConfig};
use crate::util::{expand_tilde_path, home_dir};
use anyhow::{Context, Result};
use log::trace;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub fn resolve_config(cli: Args) -> Result<Config> {
    let (mut partial_config, mut sources) = load_partial(cli.no_config)?;

    // Override with environment variables if set
    if let Ok(log_level) = std::env::var("ROOTBOX_LOG_LEVEL") {
        if let Ok(log_level) = log::LevelFilter::from_str(&log_level) {
            partial_config.log_level = Some(log_level);
            sources.insert("log_level".into(), "environment".into());
        } else {
            return Err(anyhow::anyhow!("Invalid log level: {}", log_level));
        }
    }
    for (var, field) in [
        ("ROOTBOX_ROOT", &mut partial_config.root),
        ("ROOTBOX_USER", &mut partial_config.user),
        ("ROOTBOX_ROOTFS_URL", &mut partial_config.rootfs_url),
        ("ROOTBOX_PROOT_URL", &mut partial_config.proot_url),
        ("ROOTBOX_BUNDLED_DIR", &mut partial_config.bundled_dir),
    ] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                *field = Some(value);
                let key = var
                    .strip_prefix("ROOTBOX_")
                    .unwrap_or(var)
                    .to_lowercase();
                sources.insert(key, "environment".into());
            }
        }
    }

    // Override with CLI args if provided (highest precedence)
    if let Some(log_level) = cli.log_level {
        partial_config.log_level = Some(log_level);
        sources.insert("log_level".into(), "cli".into());
    }
    if let Some(root) = cli.root {
        partial_config.root = Some(root);
        sources.insert("root".into(), "cli".into());
    }
    if let Some(user) = cli.user {
        partial_config.user = Some(user);
        sources.insert("user".into(), "cli".into());
    }
    if let Some(rootfs_url) = cli.rootfs_url {
        partial_config.rootfs_url = Some(rootfs_url);
        sources.insert("rootfs_url".into(), "cli".into());
    }
    if let Some(proot_url) = cli.proot_url {
        partial_config.proot_url = Some(proot_url);
        sources.insert("proot_url".into(), "cli".into());
    }
    if let Some(bundled_dir) = cli.bundled_dir {
        partial_config.bundled_dir = Some(bundled_dir);
        sources.insert("bundled_dir".into(), "cli".into());
    }

    // If nothing else, fill in with some default values
    let root = match partial_config.root {
        Some(root) => expand_tilde_path(Path::new(&root))?,
        None => home_dir()?.join(".rootbox"),
    };
    if !sources.contains_key("root") {
        sources.insert("root".into(), "default".into());
    }

    let user = partial_config.user.unwrap_or("root".to_string());
    if !sources.contains_key("user") {
        sources.insert("user".into(), "default".into());
    }

    let rootfs_url = partial_config
        .rootfs_url
        .unwrap_or(DEFAULT_ROOTFS_URL.to_string());
    if !sources.contains_key("rootfs_url") {
        sources.insert("rootfs_url".into(), "default".into());
    }

    let proot_url = partial_config
        .proot_url
        .unwrap_or(DEFAULT_PROOT_URL.to_string());
    if !sources.contains_key("proot_url") {
        sources.insert("proot_url".into(), "default".into());
    }

    let bundled_dir = match partial_config.bundled_dir {
        Some(dir) => expand_tilde_path(Path::new(&dir))?,
        None => root.join("bundled"),
    };
    if !sources.contains_key("bundled_dir") {
        sources.insert("bundled_dir".into(), "default".into());
    }

    let config = Config {
        log_level: partial_config.log_level.unwrap_or(log::LevelFilter::Info),
        root,
        user,
        rootfs_url,
        proot_url,
        bundled_dir,
        sources,
    };

    validate_config(&config)?;

    trace!("Environment root: {:?}", config.root);
    trace!("User: {:?}", config.user);

    Ok(config)
}

pub fn load_partial(
    no_config: bool,
) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_paths = if no_config {
        vec![]
    } else {
        find_config_files()?
    };
    let mut sources = HashMap::new();
    if config_paths.is_empty() {
        trace!("No config files found, using default config");
        return Ok((PartialConfig::default(), sources));
    }

    let mut merged_config = PartialConfig::default();
    for path in config_paths.iter() {
        let config_str = std::fs::read_to_string(path).context(format!(
            "Failed to read config file {}",
            path.display()
        ))?;

        let config: PartialConfig = toml::from_str(&config_str).context(
            format!("Failed to parse config file {}", path.display()),
        )?;

        merge_configs(
            &mut merged_config,
            &mut sources,
            config,
            path.to_str()
                .context("Failed to convert config path to str")?,
        );
        trace!("Loaded config file: {}", path.display());
    }

    Ok((merged_config, sources))
}

/** Returns a vec of all config files found */
fn find_config_files() -> Result<Vec<PathBuf>> {
    let home = home_dir()?;
    let mut paths_to_check = Vec::new();

    // Any project specific files
    let mut current_dir = std::env::current_dir()?;
    loop {
        paths_to_check.push(current_dir.join(".rootbox.toml"));
        if current_dir == home || !current_dir.pop() {
            break;
        }
    }

    // ~/.config/rootbox/config.toml
    paths_to_check.push(home.join(".config/rootbox/config.toml"));

    // /etc/rootbox.toml
    paths_to_check.push(PathBuf::from("/etc/rootbox.toml"));

    // Finally reverse them so we can process them in order nicely
    paths_to_check.reverse();

    Ok(paths_to_check
        .iter()
        .filter(|path| path.is_file())
        .cloned()
        .collect())
}

fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    if let Some(log_level) = override_config.log_level {
        base.log_level = Some(log_level);
        sources.insert("log_level".into(), source.into());
    }
    if let Some(root) = override_config.root {
        base.root = Some(root);
        sources.insert("root".into(), source.into());
    }
    if let Some(user) = override_config.user {
        base.user = Some(user);
        sources.insert("user".into(), source.into());
    }
    if let Some(rootfs_url) = override_config.rootfs_url {
        base.rootfs_url = Some(rootfs_url);
        sources.insert("rootfs_url".into(), source.into());
    }
    if let Some(proot_url) = override_config.proot_url {
        base.proot_url = Some(proot_url);
        sources.insert("proot_url".into(), source.into());
    }
    if let Some(bundled_dir) = override_config.bundled_dir {
        base.bundled_dir = Some(bundled_dir);
        sources.insert("bundled_dir".into(), source.into());
    }
}

fn validate_config(config: &Config) -> Result<()> {
    if config.user.is_empty() || config.user.contains('/') {
        return Err(anyhow::anyhow!("Invalid user name: {}", config.user));
    }
    if !config.root.is_absolute() {
        return Err(anyhow::anyhow!(
            "Environment root must be an absolute path: {}",
            config.root.display()
        ));
    }

    Ok(())
}
