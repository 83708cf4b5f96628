use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use oathkeeper_core::ProofMetadata;
use uuid::Uuid;

use crate::common;

#[derive(Args)]
pub struct SubmitArgs {
    /// Cycle to submit against
    #[arg(long)]
    pub cycle: Uuid,
    /// Proof artifact file
    #[arg(long)]
    pub file: PathBuf,
    /// MIME type; guessed from the extension when omitted
    #[arg(long)]
    pub content_type: Option<String>,
}

pub fn run(args: SubmitArgs) -> Result<(), Box<dyn Error>> {
    let rt = common::open_runtime()?;
    let owner = common::default_owner(&rt)?;

    let bytes = std::fs::read(&args.file)?;
    let content_type = args
        .content_type
        .clone()
        .or_else(|| guess_content_type(&args.file))
        .ok_or("cannot determine content type; pass --content-type")?;
    let metadata = ProofMetadata::new(content_type, bytes.len() as u64);

    let proof_ref = rt.engine.put_proof(&bytes, &metadata)?;
    let outcome = rt.engine.submit(owner, args.cycle, proof_ref, common::now())?;

    common::save_owner(&rt, owner)?;
    common::record_finalized_cycle(&rt, owner, &outcome.cycle)?;
    common::record_events(&rt, &outcome.events)?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn guess_content_type(path: &Path) -> Option<String> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg".into()),
        "png" => Some("image/png".into()),
        _ => None,
    }
}
