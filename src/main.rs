#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::use_debug,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]

mod actions;
mod archive;
mod config;
mod env;
mod fetch;
mod logger;
mod proot;
mod util;

use anyhow::{Context, Result, anyhow};
use config::{cli, resolve_config};

use env::Env;
use log::Log;
use serde_json::Value;
use util::{print_json_output, set_json_output, set_should_print_output};

use clap::Parser;
pub fn main() -> Result<()> {
    let logger = logger::RootboxLogger::new(log::LevelFilter::Trace)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let cli: cli::Args = cli::Args::parse();

    if let Some(log_level) = cli.log_level {
        logger.set_level(log_level);
    } else {
        logger.set_level(log::LevelFilter::Info);
    };

    let config = resolve_config(cli.clone()).context("Resolving config")?;

    // Now that we've loaded the config, we can set the log level and print out any deferred messages
    // emitted while we were loading the config.
    logger.set_level(config.log_level);
    logger.print_deferred();

    set_should_print_output(!cli.json);

    // Handle the action if one was specified
    if let Some(subcommand) = cli.action {
        let result = match subcommand {
            cli::Action::Config { keys } => actions::config(&config, keys),
            cli::Action::Install => actions::install(&config),
            cli::Action::Status => actions::status(&config),
            cli::Action::Delete { yes } => actions::delete(&config, yes),
        };
        if cli.json {
            if result.is_ok() {
                set_json_output(
                    "status",
                    &Value::String("success".to_string()),
                );
            } else {
                set_json_output("status", &Value::String("error".to_string()));
                set_json_output(
                    "error",
                    &Value::String(
                        result
                            .as_ref()
                            .expect_err("Failed to get error")
                            .to_string(),
                    ),
                );
            }
            print_json_output()?;
            if result.is_err() {
                std::process::exit(1);
            }
        }
        logger.flush();
        return result;
    }

    //
    // If no subcommand was specified, we're running a command inside the
    // environment. The command is joined and handed to `/bin/sh -c` so shell
    // syntax works the way callers expect.
    //
    let command = match cli.sandboxed_command {
        Some(sandboxed_command) => sandboxed_command.join(" "),
        None => std::env::var("SHELL").unwrap_or("sh".to_string()),
    };

    let runtime = Env::from_config(&config);
    let exit_code = proot::run(&runtime, &command, &config.user, &mut |line| {
        util::print_output(line);
    })
    .context("Running command in environment")?;

    logger.flush();
    std::process::exit(exit_code);
}
