use crate::config::Config;
use crate::env::Env;
use crate::outln;
use crate::proot::{resolve_loader, resolve_proot};
use crate::util::{human_bytes, set_json_output};
use anyhow::Result;
use log::trace;
use serde_json::{Value, json};

pub fn status(config: &Config) -> Result<()> {
    let env = Env::from_config(config);
    trace!("Status of environment {}", env.root.display());

    let state = env.install_state();
    let rootfs_ready = env.rootfs_ready();
    let proot = resolve_proot(&env);
    let loader = resolve_loader(&env);
    let used = env.storage_used();
    let required = env.storage_required();

    outln!("State:     {}", state);
    outln!("Rootfs:    {}", if rootfs_ready { "ready" } else { "not ready" });
    match &proot {
        Some(path) => outln!("proot:     {}", path.display()),
        None => outln!("proot:     not available"),
    }
    match &loader {
        Some(path) => outln!("Loader:    {}", path.display()),
        None => outln!("Loader:    built-in"),
    }
    outln!("Storage:   {} used", human_bytes(used));
    if !env.installed() {
        outln!("Required:  {} for a full install", human_bytes(required));
    }

    set_json_output("state", &Value::String(state.to_string()));
    set_json_output("rootfs_ready", &Value::Bool(rootfs_ready));
    set_json_output(
        "proot",
        &proot.map_or(Value::Null, |p| json!(p.display().to_string())),
    );
    set_json_output(
        "loader",
        &loader.map_or(Value::Null, |p| json!(p.display().to_string())),
    );
    set_json_output("storage_used_bytes", &json!(used));
    set_json_output("storage_required_bytes", &json!(required));

    Ok(())
}
