use std::error::Error;

use crate::common;

pub fn run() -> Result<(), Box<dyn Error>> {
    let rt = common::open_runtime()?;
    let owner = common::default_owner(&rt)?;
    common::save_owner(&rt, owner)?;
    let snapshot = rt.engine.status(owner)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
