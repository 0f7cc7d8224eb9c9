use clap::{Subcommand, ValueEnum};
use dinnerhop_core::Config;

use super::{print_json, CmdResult};

/// Top-level tables of `config.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    /// Host capacity, relaxation and scoring knobs
    Matching,
    /// Default envelope stage offsets; per-event timing overrides these
    Timing,
    /// Cycling speed, detour factor and route lookup limits
    Distance,
    /// Clues dealt per hosted course
    Clues,
}

impl Section {
    const NAMES: &'static str = "matching, timing, distance, clues";

    fn key(self) -> &'static str {
        match self {
            Section::Matching => "matching",
            Section::Timing => "timing",
            Section::Distance => "distance",
            Section::Clues => "clues",
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting, e.g. `matching.default_max_guests` or `timing.offsets.street`
    Get {
        /// Dot path starting with a section name
        key: String,
    },
    /// Change one setting and write `config.toml`
    Set {
        /// Dot path starting with a section name
        key: String,
        /// New value; numbers and booleans are parsed, anything else is a string
        value: String,
    },
    /// Print the effective configuration as JSON
    List {
        /// Only this section
        #[arg(long, value_enum)]
        section: Option<Section>,
    },
    /// Restore defaults, for one section or everything
    Reset {
        #[arg(long, value_enum)]
        section: Option<Section>,
    },
}

pub fn run(action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(unknown_key(&key).into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            if config.get(&key).is_none() {
                return Err(unknown_key(&key).into());
            }
            config.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List { section } => {
            let config = Config::load()?;
            match section {
                Some(section) => print_json(&serde_json::to_value(&config)?[section.key()])?,
                None => print_json(&config)?,
            }
        }
        ConfigAction::Reset { section } => {
            let mut config = Config::load()?;
            let defaults = Config::default();
            match section {
                Some(Section::Matching) => config.matching = defaults.matching,
                Some(Section::Timing) => config.timing = defaults.timing,
                Some(Section::Distance) => config.distance = defaults.distance,
                Some(Section::Clues) => config.clues = defaults.clues,
                None => config = defaults,
            }
            config.save()?;
            match section {
                Some(section) => println!("{} reset to defaults", section.key()),
                None => println!("config reset to defaults"),
            }
        }
    }
    Ok(())
}

fn unknown_key(key: &str) -> String {
    format!("unknown key: {key} (sections: {})", Section::NAMES)
}
