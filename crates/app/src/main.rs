//! AttendMax - classroom attendance by short-lived session tokens
//!
//! Command line front end over the attendance core. Results are printed to
//! stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use attendmax_core::{Caller, Role};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod state;

#[derive(Parser)]
#[command(name = "attendmax")]
#[command(about = "AttendMax - session-token attendance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to the platform data directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load subjects, instructors and students from a roster file
    Provision {
        /// Roster TOML file
        roster: PathBuf,
    },

    /// Issue a session token for a subject
    Issue {
        #[command(flatten)]
        caller: CallerArgs,

        /// Subject code
        subject: String,
    },

    /// Redeem a session token code
    Redeem {
        #[command(flatten)]
        caller: CallerArgs,

        /// Token code as displayed (subject:token:expiry)
        code: String,
    },

    /// Show a subject's attendance for one day
    Status {
        #[command(flatten)]
        caller: CallerArgs,

        /// Subject code
        subject: String,

        /// Day to report (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show a student's attendance history
    History {
        #[command(flatten)]
        caller: CallerArgs,

        /// Student to report on (defaults to the caller)
        #[arg(short, long)]
        student: Option<String>,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day of the range (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// List subjects (teachers see the subjects they teach)
    Subjects {
        #[command(flatten)]
        caller: CallerArgs,

        /// Only subjects of this department
        #[arg(short, long)]
        department: Option<String>,

        /// Only subjects of this year
        #[arg(short, long)]
        year: Option<u8>,
    },

    /// List tokens issued for a subject
    Sessions {
        #[command(flatten)]
        caller: CallerArgs,

        /// Subject code
        subject: String,
    },
}

/// Identity of the authenticated caller
#[derive(Args)]
struct CallerArgs {
    /// Caller user ID
    #[arg(short, long)]
    user: String,

    /// Caller role
    #[arg(short, long, value_enum)]
    role: RoleArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Student,
    Teacher,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Student => Role::Student,
            RoleArg::Teacher => Role::Teacher,
            RoleArg::Admin => Role::Admin,
        }
    }
}

impl CallerArgs {
    fn caller(&self) -> Caller {
        Caller::new(self.user.clone(), self.role.into())
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let state = state::AppState::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Provision { roster } => {
            print_json(&commands::provision(&state, &roster)?)?;
        }
        Commands::Issue { caller, subject } => {
            print_json(&commands::issue(&state, &caller.caller(), &subject)?)?;
        }
        Commands::Redeem { caller, code } => {
            print_json(&commands::redeem(&state, &caller.caller(), &code)?)?;
        }
        Commands::Status {
            caller,
            subject,
            date,
        } => {
            print_json(&commands::status(&state, &caller.caller(), &subject, date)?)?;
        }
        Commands::History {
            caller,
            student,
            from,
            to,
        } => {
            print_json(&commands::history(
                &state,
                &caller.caller(),
                student.as_deref(),
                from,
                to,
            )?)?;
        }
        Commands::Subjects {
            caller,
            department,
            year,
        } => {
            print_json(&commands::subjects(
                &state,
                &caller.caller(),
                department.as_deref(),
                year,
            )?)?;
        }
        Commands::Sessions { caller, subject } => {
            print_json(&commands::sessions(&state, &caller.caller(), &subject)?)?;
        }
    }

    Ok(())
}
