use clap::Parser;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None,
    override_usage = "\n    rootbox [OPTIONS] [ACTION]\n    rootbox [OPTIONS] <SANDBOXED_COMMAND ...>")]
pub struct Args {
    /**********************/
    /* Flags and settings */
    /**********************/
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Environment root directory. Defaults to `~/.rootbox`
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<String>,

    /// User presented inside the environment; picks the working directory
    /// (`/root` for root, `/home/<user>` otherwise). Defaults to `root`
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// URL of the compressed rootfs tarball to install
    #[arg(long, global = true, value_hint = clap::ValueHint::Url)]
    pub rootfs_url: Option<String>,

    /// URL of the .deb package carrying the proot binary
    #[arg(long, global = true, value_hint = clap::ValueHint::Url)]
    pub proot_url: Option<String>,

    /// Directory holding a bundled proot/loader pair, consulted when no
    /// vendor-extracted binary exists
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub bundled_dir: Option<String>,

    /// Formats action output as a JSON blob. Does nothing for sandboxed commands.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    /***************/
    /* Subcommands */
    /***************/
    #[command(subcommand)]
    pub action: Option<Action>,

    /*********************/
    /* Sandboxed Command */
    /*********************/
    /// The command to run inside the environment. If no command is provided,
    /// an interactive shell is started.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..,
        value_parser = validate_command,
        help_heading = "Sandboxed Command",
    )]
    pub sandboxed_command: Option<Vec<String>>,
}

#[derive(clap::Subcommand, Clone, Debug)]
#[command(subcommand_help_heading = "Actions")]
pub enum Action {
    /// Download and unpack the rootfs and the proot binary, then write the
    /// environment init script. Completed phases are skipped on re-run.
    Install,

    /// Show environment state: installed, rootfs readiness, proot
    /// availability, and storage accounting.
    Status,

    /// Delete the environment root and all associated files
    Delete {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Get current configuration options
    Config {
        /// The keys to get from the configuration
        #[arg(value_name = "KEYS", num_args = 0..)]
        keys: Option<Vec<String>>,
    },
}

static ARG_COUNT: AtomicUsize = AtomicUsize::new(0);

// Because of the way clap works, if someone tries to pass a parameter that doesn't exist, we'll
// see it here as a command. This is a bit of a hack to catch that case.
fn validate_command(s: &str) -> Result<String, String> {
    ARG_COUNT.fetch_add(1, Ordering::Relaxed);
    if ARG_COUNT.load(Ordering::Relaxed) == 1 {
        if s.starts_with('-') && s != "--" {
            Err(String::from("Unknown option"))
        } else {
            Ok(s.to_string())
        }
    } else {
        Ok(s.to_string())
    }
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}
