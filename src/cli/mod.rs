pub mod punch;
pub mod report;

use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use report::LogCommand;
use tracing::level_filters::LevelFilter;

use crate::{
    config::Config,
    storage::store::PunchStore,
    utils::{dir::create_application_default_path, logging::enable_logging},
};

#[derive(Parser, Debug)]
#[command(name = "Punchlog", version, long_about = None)]
#[command(about = "Track work sessions on named projects", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Punch in on a project")]
    In {
        project: String,
        #[arg(
            long,
            help = "Session start. Examples are \"10 minutes ago\", \"9:00 15/03/2025\". Defaults to now"
        )]
        time: Option<String>,
        #[arg(
            long,
            help = "Backfill the session end, recording an already-closed session"
        )]
        out: Option<String>,
        #[arg(long, help = "Hourly rate override for this session")]
        rate: Option<f64>,
        #[arg(short, long, help = "Attach a comment to the session")]
        comment: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
    },
    #[command(about = "Punch out of the current session")]
    Out {
        #[arg(long, help = "Only punch out of this project")]
        project: Option<String>,
        #[arg(
            long,
            help = "Session end. Examples are \"5 minutes ago\", \"17:30\". Defaults to now"
        )]
        time: Option<String>,
        #[arg(short, long, help = "Attach a closing comment")]
        comment: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
    },
    #[command(about = "Attach a comment to the current session, or the most recent one")]
    Comment { text: String },
    #[command(about = "Show the current session")]
    Status {},
    #[command(about = "Report tracked time and pay grouped by day and project")]
    Log {
        #[command(flatten)]
        command: LogCommand,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Parses an optional user-supplied time argument, surfacing failures as
/// clap usage errors the way the rest of the argument validation does.
fn parse_time_arg(value: Option<String>, date_style: DateStyle) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match parse_date_string(&value, Local::now(), date_style.into()) {
        Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate time {value:?}: {e}"),
            )
            .into()),
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let app_dir = create_application_default_path()?;
    enable_logging(&app_dir, logging_level, args.log)?;

    let config = Config::load(&Config::config_file(&app_dir))?;
    let punch_dir = config
        .punch_directory
        .clone()
        .unwrap_or_else(|| app_dir.join("punches"));
    let store = PunchStore::new(punch_dir, config)?;

    match args.commands {
        Commands::In {
            project,
            time,
            out,
            rate,
            comment,
            date_style,
        } => {
            let time = parse_time_arg(time, date_style)?;
            let out = parse_time_arg(out, date_style)?;
            punch::punch_in(&store, project, time, out, rate, comment).await
        }
        Commands::Out {
            project,
            time,
            comment,
            date_style,
        } => {
            let time = parse_time_arg(time, date_style)?;
            punch::punch_out(&store, project, time, comment).await
        }
        Commands::Comment { text } => punch::add_comment(&store, text).await,
        Commands::Status {} => punch::status(&store).await,
        Commands::Log { command } => report::process_log_command(&store, command).await,
    }
}
