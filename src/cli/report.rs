use std::collections::BTreeMap;

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser};
use now::DateTimeNow;

use crate::storage::query::Direction;
use crate::storage::store::PunchStore;
use crate::utils::{duration::WorkDuration, time::next_day_start};

use super::punch::format_pay;
use super::{Args, DateStyle};

#[derive(Debug, Parser)]
pub struct LogCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\". Defaults to the start of today"
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\". Defaults to now"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to report the whole day"
    )]
    treat_as_days: bool,
    #[arg(short, long, help = "Restrict the report to one project")]
    project: Option<String>,
}

/// Command to process `log`. Reports tracked sessions between `start_date`
/// and `end_date` grouped by day, with per-project duration and pay totals.
/// A pure consumer of the query engine.
pub async fn process_log_command(
    store: &PunchStore,
    LogCommand {
        start_date,
        end_date,
        date_style,
        treat_as_days,
        project,
    }: LogCommand,
) -> Result<()> {
    let (start, end) = parse_range(start_date, end_date, date_style, treat_as_days)?;
    let start_utc = start.with_timezone(&Utc);
    let end_utc = end.with_timezone(&Utc);

    let project_filter = project.clone();
    let punches = store
        .punches()
        .filter(move |punch| {
            punch.in_time >= start_utc
                && punch.in_time < end_utc
                && project_filter
                    .as_deref()
                    .map_or(true, |alias| punch.project == alias)
        })
        .order_by_dir("in", Direction::Asc)
        .run()
        .await;

    if punches.is_empty() {
        println!(
            "No punches between {} and {}",
            start.format("%x %H:%M"),
            end.format("%x %H:%M")
        );
        return Ok(());
    }

    let mut current_day: Option<NaiveDate> = None;
    let mut totals: BTreeMap<String, (WorkDuration, f64)> = BTreeMap::new();
    for punch in &punches {
        let day = punch.local_date();
        if current_day != Some(day) {
            println!(
                "\n{}",
                Style::new()
                    .bold()
                    .underline()
                    .paint(day.format("%A %x").to_string())
            );
            current_day = Some(day);
        }

        let out_label = punch
            .out_time
            .map(|out| out.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_else(|| "now".into());
        println!(
            "  {} - {}\t{}\t{}\t{}",
            punch.in_time.with_timezone(&Local).format("%H:%M"),
            out_label,
            store.config().project_name(&punch.project),
            punch.duration(),
            format_pay(punch.pay())
        );
        for comment in &punch.comments {
            println!("\t- {}", comment.comment);
        }

        let entry = totals
            .entry(punch.project.clone())
            .or_insert((WorkDuration::default(), 0.0));
        entry.0 = entry.0.plus(punch.duration());
        entry.1 += punch.pay();
    }

    println!();
    let mut total_duration = WorkDuration::default();
    let mut total_pay = 0.0;
    for (alias, (duration, pay)) in &totals {
        println!(
            "{}\t{}\t{}",
            Style::new().bold().paint(store.config().project_name(alias)),
            duration,
            Colour::Green.paint(format_pay(*pay))
        );
        total_duration = total_duration.plus(*duration);
        total_pay += pay;
    }
    if totals.len() > 1 {
        println!(
            "{}\t{}\t{}",
            Style::new().bold().paint("Total"),
            total_duration,
            Colour::Green.paint(format_pay(total_pay))
        );
    }
    Ok(())
}

/// Also provides sensible defaults for the `log` command: today so far.
fn parse_range(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
    treat_as_days: bool,
) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();

    let mut start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => now.beginning_of_day(),
    };
    let mut end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    if treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }
    Ok((start, end))
}
