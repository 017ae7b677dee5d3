mod cli;
mod daemon;
mod engine;
mod keyboard;
mod kwin;
mod pulse;
mod tray;
mod window;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "focusvol",
    about = "Volume hotkeys for the application in the focused window"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon (for systemd or manual start)
    Daemon {
        /// Log level (trace, debug, info, warn, error)
        #[arg(long, env = "FOCUSVOL_LOG_LEVEL", default_value = "info")]
        log_level: String,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// List key names accepted in hotkey bindings
    Keys,
    /// Print configured hotkeys as they fire, without touching any volume
    Listen,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print current config as TOML
    Show,
    /// Print config directory path
    Dir,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        None => {
            use clap::CommandFactory;
            let _ = Cli::command().print_help();
            println!();
            std::process::exit(0);
        }
        // The daemon builds its own multi-thread runtime; the other commands
        // are synchronous.
        Some(Commands::Daemon { log_level }) => daemon::run(&log_level),
        Some(cmd) => cli::run(cmd),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
