use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod app_bootstrap;
mod commands;
mod logging;
mod platform;
mod settings;
mod settings_io;

/// Choose which applications and windows stay out of your screen capture
#[derive(Debug, Parser)]
#[command(name = "windowcloak", version)]
struct Cli {
    /// Log at debug level regardless of settings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the stored policy, permission and file locations
    Status,
    /// List running applications and their windows
    Apps {
        /// Include applications without windows
        #[arg(long)]
        all: bool,
    },
    /// Hide every window of an application
    Hide { app: String },
    /// Stop hiding an application
    Unhide { app: String },
    /// Flip whether an application is hidden
    Toggle { app: String },
    /// Hide one window of an application
    HideWindow { app: String, window: u32 },
    /// Show one previously hidden window again
    ShowWindow { app: String, window: u32 },
    /// Show or hide the pointer in captured frames
    Cursor {
        #[arg(value_enum)]
        mode: Visibility,
    },
    /// Show or hide this app in the Dock and app switcher
    OwnWindow {
        #[arg(value_enum)]
        mode: Visibility,
    },
    /// Restore the default policy
    Reset,
    /// Print the exclusion filter for the current windows as JSON
    Filter,
    /// Drop closed windows from the stored policy
    Prune,
    /// Keep a live session and print every filter change
    Watch {
        /// Display to capture; defaults to the first one
        #[arg(long)]
        display: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Visibility {
    Show,
    Hide,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = app_bootstrap::load_initial_settings_for_logging();
    app_bootstrap::init_logging(&settings, cli.verbose);
    app_bootstrap::install_panic_hook();

    let env = app_bootstrap::build_environment(settings)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Status => commands::inventory::status(&env),
        Commands::Apps { all } => runtime.block_on(commands::inventory::apps(&env, all)),
        Commands::Hide { app } => commands::policy::hide_app(&env, &app),
        Commands::Unhide { app } => commands::policy::unhide_app(&env, &app),
        Commands::Toggle { app } => commands::policy::toggle_app(&env, &app),
        Commands::HideWindow { app, window } => {
            runtime.block_on(commands::policy::hide_window(&env, &app, window))
        }
        Commands::ShowWindow { app, window } => commands::policy::show_window(&env, &app, window),
        Commands::Cursor { mode } => {
            commands::policy::set_hide_cursor(&env, matches!(mode, Visibility::Hide))
        }
        Commands::OwnWindow { mode } => {
            commands::policy::set_show_own_window(&env, matches!(mode, Visibility::Show))
        }
        Commands::Reset => commands::policy::reset(&env),
        Commands::Filter => runtime.block_on(commands::inventory::filter(&env)),
        Commands::Prune => runtime.block_on(commands::inventory::prune(&env)),
        Commands::Watch { display } => runtime.block_on(commands::watch::watch(&env, display)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_window_commands() {
        let cli = Cli::try_parse_from(["windowcloak", "hide-window", "com.example.chat", "42"]).unwrap();
        match cli.command {
            Commands::HideWindow { app, window } => {
                assert_eq!(app, "com.example.chat");
                assert_eq!(window, 42);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_visibility_values() {
        let cli = Cli::try_parse_from(["windowcloak", "-v", "cursor", "hide"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Cursor { mode: Visibility::Hide }));
        assert!(Cli::try_parse_from(["windowcloak", "cursor", "maybe"]).is_err());
    }
}
