use std::error::Error;

use clap::Subcommand;
use oathkeeper_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration file
    Init,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
        ConfigAction::Init => {
            let config = Config::load()?;
            config.save()?;
            println!("wrote {}", Config::path()?.display());
        }
    }
    Ok(())
}
