use anyhow::{bail, Result};
use chrono::{DateTime, Local, Utc};

use crate::storage::entities::{Punch, PunchProps};
use crate::storage::store::{PunchOutOptions, PunchStore};

/// Starts a session. The "at most one open session" rule lives here, not in
/// the store: historical data may contain several open punches, so the store
/// only reports them and the command refuses to add another.
pub async fn punch_in(
    store: &PunchStore,
    project: String,
    time: Option<DateTime<Utc>>,
    out: Option<DateTime<Utc>>,
    rate: Option<f64>,
    comment: Option<String>,
) -> Result<()> {
    if let Some(open) = store.current_open_punch(None).await? {
        bail!(
            "Already punched in on {} since {}",
            open.project,
            format_moment(open.in_time)
        );
    }

    let mut props = PunchProps::new(project);
    props.in_time = time;
    props.out_time = out;
    props.rate = rate;
    let mut punch = Punch::new(props, store.config())?;
    if let Some(comment) = comment {
        punch.add_comment(comment);
    }

    store.save_punch(&punch).await?;
    let marker = if punch.is_open() { &punch.project } else { "" };
    store.write_active_marker(marker).await?;

    if punch.is_open() {
        println!(
            "Punched in on {} at {}",
            store.config().project_name(&punch.project),
            format_moment(punch.in_time)
        );
    } else {
        println!(
            "Recorded {} on {} ({})",
            punch.duration(),
            store.config().project_name(&punch.project),
            format_pay(punch.pay())
        );
    }
    Ok(())
}

pub async fn punch_out(
    store: &PunchStore,
    project: Option<String>,
    time: Option<DateTime<Utc>>,
    comment: Option<String>,
) -> Result<()> {
    let Some(mut punch) = store.current_open_punch(project.as_deref()).await? else {
        bail!("Not currently punched in");
    };

    store
        .punch_out(
            &mut punch,
            comment.as_deref(),
            PunchOutOptions {
                time,
                autosave: true,
            },
        )
        .await?;
    store.write_active_marker("").await?;

    println!(
        "Punched out of {} after {} ({})",
        store.config().project_name(&punch.project),
        punch.duration(),
        format_pay(punch.pay())
    );
    Ok(())
}

/// Comments target the open session when there is one, otherwise the most
/// recently updated punch.
pub async fn add_comment(store: &PunchStore, text: String) -> Result<()> {
    let target = match store.current_open_punch(None).await? {
        Some(punch) => Some(punch),
        None => store.latest_punch().await?,
    };
    let Some(mut punch) = target else {
        bail!("No punches recorded yet");
    };

    punch.add_comment(text);
    store.save_punch(&punch).await?;

    println!(
        "Added comment to {}",
        store.config().project_name(&punch.project)
    );
    Ok(())
}

pub async fn status(store: &PunchStore) -> Result<()> {
    match store.current_open_punch(None).await? {
        Some(punch) => {
            println!(
                "Punched in on {} since {} ({} so far, {})",
                store.config().project_name(&punch.project),
                format_moment(punch.in_time),
                punch.duration(),
                format_pay(punch.pay())
            );
        }
        None => println!("Not punched in"),
    }
    Ok(())
}

pub fn format_moment(moment: DateTime<Utc>) -> String {
    moment.with_timezone(&Local).format("%x %H:%M").to_string()
}

pub fn format_pay(pay: f64) -> String {
    format!("${pay:.2}")
}

#[cfg(test)]
mod tests {
    use super::format_pay;

    #[test]
    fn test_format_pay_rounds_to_cents() {
        assert_eq!(format_pay(30.0), "$30.00");
        assert_eq!(format_pay(12.345), "$12.35");
    }
}
