use std::error::Error;

use chrono::NaiveTime;
use clap::Subcommand;
use oathkeeper_core::{Recurrence, Schedule};
use uuid::Uuid;

use crate::common;

#[derive(Subcommand)]
pub enum ProtocolAction {
    /// Commit to a new protocol
    Commit {
        /// Protocol title
        #[arg(long)]
        title: String,
        /// Recurrence: daily, weekly, or every-n-days
        #[arg(long, default_value = "daily")]
        recur: String,
        /// Days of week for weekly recurrence (e.g. mon,thu)
        #[arg(long)]
        days: Option<String>,
        /// Stride for every-n-days recurrence
        #[arg(long)]
        every: Option<u32>,
        /// Due time of day, UTC (HH:MM)
        #[arg(long)]
        at: String,
        /// Grace window in minutes
        #[arg(long, default_value = "30")]
        grace: i64,
    },
    /// Print protocols as JSON
    List,
    /// Archive a protocol
    Archive {
        /// Protocol id
        id: Uuid,
    },
}

pub fn run(action: ProtocolAction) -> Result<(), Box<dyn Error>> {
    let rt = common::open_runtime()?;
    let owner = common::default_owner(&rt)?;

    match action {
        ProtocolAction::Commit {
            title,
            recur,
            days,
            every,
            at,
            grace,
        } => {
            let schedule = Schedule::new(
                parse_recurrence(&recur, days.as_deref(), every)?,
                parse_due_time(&at)?,
            );
            let outcome = rt.engine.commit(owner, title, schedule, grace, common::now())?;
            common::save_owner(&rt, owner)?;
            println!("{}", serde_json::to_string_pretty(&outcome.protocol)?);
        }
        ProtocolAction::List => {
            let state = rt.engine.export_owner(owner)?;
            println!(
                "{}",
                serde_json::to_string_pretty(state.registry.protocols())?
            );
        }
        ProtocolAction::Archive { id } => {
            rt.engine.archive(owner, id, common::now())?;
            common::save_owner(&rt, owner)?;
            println!("archived {id}");
        }
    }
    Ok(())
}

fn parse_recurrence(
    recur: &str,
    days: Option<&str>,
    every: Option<u32>,
) -> Result<Recurrence, Box<dyn Error>> {
    match recur {
        "daily" => Ok(Recurrence::Daily),
        "weekly" => Ok(Recurrence::Weekly {
            days: parse_days(days.unwrap_or(""))?,
        }),
        "every-n-days" => Ok(Recurrence::EveryNDays {
            n: every.ok_or("--every is required for every-n-days recurrence")?,
        }),
        other => Err(format!("unknown recurrence: {other}").into()),
    }
}

fn parse_due_time(raw: &str) -> Result<NaiveTime, Box<dyn Error>> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|e| format!("invalid due time '{raw}': {e}").into())
}

fn parse_days(raw: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|day| match day.to_ascii_lowercase().as_str() {
            "sun" => Ok(0),
            "mon" => Ok(1),
            "tue" => Ok(2),
            "wed" => Ok(3),
            "thu" => Ok(4),
            "fri" => Ok(5),
            "sat" => Ok(6),
            other => Err(format!("unknown weekday: {other}").into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_due_times() {
        assert_eq!(
            parse_due_time("22:00").unwrap(),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap()
        );
        assert!(parse_due_time("25:00").is_err());
        assert!(parse_due_time("evening").is_err());
    }

    #[test]
    fn parses_day_lists() {
        assert_eq!(parse_days("mon,thu").unwrap(), vec![1, 4]);
        assert_eq!(parse_days("Sun, sat").unwrap(), vec![0, 6]);
        assert!(parse_days("mon,funday").is_err());
        assert!(parse_days("").unwrap().is_empty());
    }

    #[test]
    fn parses_recurrences() {
        assert_eq!(parse_recurrence("daily", None, None).unwrap(), Recurrence::Daily);
        assert_eq!(
            parse_recurrence("weekly", Some("mon"), None).unwrap(),
            Recurrence::Weekly { days: vec![1] }
        );
        assert_eq!(
            parse_recurrence("every-n-days", None, Some(3)).unwrap(),
            Recurrence::EveryNDays { n: 3 }
        );
        assert!(parse_recurrence("every-n-days", None, None).is_err());
        assert!(parse_recurrence("hourly", None, None).is_err());
    }
}
