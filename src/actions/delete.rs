use crate::config::Config;
use crate::env::Env;
use crate::util::human_bytes;
use crate::{outln, util::set_json_output};
use anyhow::Result;
use colored::Colorize;
use log::trace;
use serde_json::Value;
use std::io::{self, Write};

pub fn delete(config: &Config, yes: bool) -> Result<()> {
    let env = Env::from_config(config);
    trace!("Preparing to delete environment {}", env.root.display());

    if !env.root.exists() {
        outln!("No environment found at {}", env.root.display());
        set_json_output("status", &Value::String("nothing-to-delete".into()));
        return Ok(());
    }

    if !yes {
        outln!(
            "This will delete {} ({} used).",
            env.root.display(),
            human_bytes(env.storage_used())
        );

        // Use eprint! for the prompt since print! is not allowed
        eprint!("Are you sure? [y/N] ");
        let _ = io::stderr().flush();

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().eq_ignore_ascii_case("y") {
            outln!("Delete operation cancelled.");
            set_json_output("status", &Value::String("cancelled".into()));
            return Ok(());
        }
    }

    env.delete(&mut |state| {
        trace!("Environment state is now: {}", state);
    })?;

    outln!("Deleted environment: {}", env.root.display().to_string().green());
    set_json_output("status", &Value::String("success".into()));
    set_json_output(
        "deleted",
        &Value::String(env.root.display().to_string()),
    );

    Ok(())
}
