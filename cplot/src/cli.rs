//! Command-line argument model.

use crate::actions::DeviceAction;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cplot - drive an AxiDraw-class pen plotter over its EBB controller
#[derive(Parser, Debug)]
#[command(name = "cplot")]
#[command(version)]
#[command(about = "Plan and plot polylines on AxiDraw-class pen plotters")]
#[command(long_about = None)]
pub struct Args {
    /// Serial port of the controller ("sim" selects the simulated controller)
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<String>,

    /// Plotter model (profile id)
    #[arg(long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/cplot/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON logs and JSON command output
    #[arg(long, global = true)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Direct device control
    #[command(subcommand)]
    Device(DeviceAction),

    /// Plan a path file and print the blocks
    Plan {
        /// TOML file with `[[paths]] points = [[x, y], ...]` (mm)
        file: PathBuf,
    },

    /// Plan a path file and draw it
    Plot {
        /// TOML file with `[[paths]] points = [[x, y], ...]` (mm)
        file: PathBuf,

        /// Run the stepper without a device and only log the moves
        #[arg(long)]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn argument_model_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommands() {
        let args = Args::try_parse_from([
            "cplot", "device", "jog", "--dx", "5", "--dy", "-2.5", "--port", "sim", "-v",
        ])
        .unwrap();
        assert_eq!(args.port.as_deref(), Some("sim"));
        assert!(args.verbose);
        assert_eq!(args.command, Command::Device(DeviceAction::Jog { dx: 5.0, dy: -2.5 }));
    }

    #[test]
    fn plot_takes_dry_run_flag() {
        let args = Args::try_parse_from(["cplot", "plot", "art.toml", "--dry-run"]).unwrap();
        assert_eq!(
            args.command,
            Command::Plot {
                file: PathBuf::from("art.toml"),
                dry_run: true
            }
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(Args::try_parse_from(["cplot", "device", "dance"]).is_err());
    }
}
