use serde::{Deserialize, Serialize};
use std::path::Path;
use time::Date;

use crate::dsl::PartialDatePolicy;

/// Quest catalog as written in YAML.
#[derive(Debug, Deserialize, Serialize)]
pub struct QuestsConfig {
    pub quests: Vec<QuestConfig>,
    /// Overrides the built-in policy for year / year-month check dates.
    #[serde(default)]
    pub partial_date_policy: Option<PartialDatePolicy>,
}

impl QuestsConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QuestConfig {
    pub name: String,
    pub filter: String,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub wiki_link: Option<String>,
    #[serde(default)]
    pub countries: CountrySetting,
}

/// Where a quest is offered: `all`, `{only: [..]}` or `{except: [..]}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CountrySetting {
    Keyword(AllCountries),
    Only { only: Vec<String> },
    Except { except: Vec<String> },
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AllCountries {
    All,
}

impl Default for CountrySetting {
    fn default() -> Self {
        CountrySetting::Keyword(AllCountries::All)
    }
}

impl CountrySetting {
    /// Country codes compare case-insensitively.
    pub fn allows(&self, country: &str) -> bool {
        let listed = |codes: &[String]| codes.iter().any(|c| c.eq_ignore_ascii_case(country));
        match self {
            CountrySetting::Keyword(AllCountries::All) => true,
            CountrySetting::Only { only } => listed(only),
            CountrySetting::Except { except } => !listed(except),
        }
    }
}

/// Settings for one scan, taken from the command line.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// "today" for every relative date in this scan.
    pub reference_date: Date,
    pub country: Option<String>,
    pub strict: bool,
    pub batch_size: usize,
}

pub const DEFAULT_BATCH_SIZE: usize = 4096;

impl RuntimeConfig {
    pub fn new(reference_date: Date) -> Self {
        Self {
            reference_date,
            country: None,
            strict: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}
