#![allow(clippy::option_map_unit_fn)]
use crate::config::Config;
use crate::env::Env;
use crate::outln;
use crate::util::set_json_output;
use anyhow::Result;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;

pub fn config(config: &Config, keys: Option<Vec<String>>) -> Result<()> {
    let keys = keys.unwrap_or_else(|| {
        [
            "root",
            "user",
            "rootfs_url",
            "proot_url",
            "bundled_dir",
            "log_level",
            "rootfs_dir",
            "downloads_dir",
        ]
        .map(String::from)
        .to_vec()
    });
    let multi_line = keys.len() > 1;

    let env = Env::from_config(config);
    let log_level_str = config.log_level.to_string().to_lowercase();
    for key in keys {
        let (key, value) = match key.as_str() {
            "root" => ("root", config.root.to_str().unwrap_or("<error>")),
            "user" => ("user", config.user.as_str()),
            "rootfs_url" | "rootfs-url" => {
                ("rootfs_url", config.rootfs_url.as_str())
            }
            "proot_url" | "proot-url" => {
                ("proot_url", config.proot_url.as_str())
            }
            "bundled_dir" | "bundled-dir" => (
                "bundled_dir",
                config.bundled_dir.to_str().unwrap_or("<error>"),
            ),
            "log_level" | "log-level" => ("log_level", log_level_str.as_str()),
            // Derived paths, handy for scripting
            "rootfs_dir" | "rootfs-dir" => {
                ("rootfs_dir", env.rootfs_dir.to_str().unwrap_or("<error>"))
            }
            "downloads_dir" | "downloads-dir" => (
                "downloads_dir",
                env.downloads_dir.to_str().unwrap_or("<error>"),
            ),
            _ => {
                return Err(anyhow::anyhow!("Unknown key: {}", key));
            }
        };
        print_config_line(key, value, multi_line, &config.sources);
    }

    Ok(())
}

fn print_config_line(
    key: &str,
    value: &str,
    multi_line: bool,
    sources: &HashMap<String, String>,
) {
    sources.get(key).map(|s| {
        debug!("{}={} set from {}", key, value, s);
    });
    set_json_output(key, &Value::String(value.to_string()));

    if multi_line {
        outln!("{}={}", key, value);
    } else {
        outln!("{}", value);
    }
}
