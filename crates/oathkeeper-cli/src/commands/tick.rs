use std::error::Error;

use chrono::{DateTime, Utc};
use clap::Args;

use crate::common;

#[derive(Args)]
pub struct TickArgs {
    /// Sweep instant (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<String>,
}

pub fn run(args: TickArgs) -> Result<(), Box<dyn Error>> {
    let rt = common::open_runtime()?;
    // Make sure at least the default owner exists before sweeping.
    let _ = common::default_owner(&rt)?;

    let now = match args.at.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| format!("invalid --at '{raw}': {e}"))?
            .with_timezone(&Utc),
        None => common::now(),
    };

    let report = rt.engine.tick(now);
    for sweep in &report.owners {
        for cycle in &sweep.missed {
            common::record_finalized_cycle(&rt, sweep.owner_id, cycle)?;
        }
        common::record_events(&rt, &sweep.events)?;
    }
    common::save_all_owners(&rt)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
