//! Quest registration: compile every catalog filter once, up front.

use anyhow::{Result, bail};
use time::Date;

use crate::config::{CountrySetting, QuestsConfig};
use crate::dsl::{CompiledQuery, compile};
use crate::record::ElementRecord;

/// A quest with its compiled filter.
#[derive(Debug, Clone)]
pub struct Quest {
    pub name: String,
    pub query: CompiledQuery,
    pub commit_message: Option<String>,
    pub wiki_link: Option<String>,
    pub countries: CountrySetting,
}

impl Quest {
    pub fn is_enabled_in(&self, country: &str) -> bool {
        self.countries.allows(country)
    }

    pub fn applies_to(&self, record: &ElementRecord, reference_date: Date) -> bool {
        self.query.matches(record, reference_date)
    }
}

/// All quests that compiled successfully.
#[derive(Debug, Clone, Default)]
pub struct QuestCatalog {
    quests: Vec<Quest>,
    skipped: Vec<String>,
}

impl QuestCatalog {
    /// Compile a catalog.
    ///
    /// A quest whose filter does not compile is logged and skipped, unless
    /// `strict` is set, in which case the first such error is returned.
    pub fn compile(config: &QuestsConfig, strict: bool) -> Result<Self> {
        let mut catalog = QuestCatalog::default();

        for (i, quest) in config.quests.iter().enumerate() {
            let query = match compile(&quest.filter) {
                Ok(query) => query,
                Err(err) => {
                    let (line, column) = err.line_col(&quest.filter);
                    if strict {
                        bail!(
                            "Config: Error compiling filter of quest {} '{}' at line {}, column {}: {}",
                            i + 1,
                            quest.name,
                            line,
                            column,
                            err
                        );
                    }
                    tracing::warn!(
                        "Config: Skipping quest '{}': filter error at line {}, column {}: {}",
                        quest.name,
                        line,
                        column,
                        err
                    );
                    catalog.skipped.push(quest.name.clone());
                    continue;
                }
            };

            let query = match config.partial_date_policy {
                Some(policy) => query.with_partial_date_policy(policy),
                None => query,
            };
            tracing::debug!("Compiled quest '{}': {}", quest.name, query);

            catalog.quests.push(Quest {
                name: quest.name.clone(),
                query,
                commit_message: quest.commit_message.clone(),
                wiki_link: quest.wiki_link.clone(),
                countries: quest.countries.clone(),
            });
        }

        Ok(catalog)
    }

    /// Drop quests not offered in `country`.
    pub fn retain_country(&mut self, country: &str) {
        self.quests.retain(|quest| {
            let enabled = quest.is_enabled_in(country);
            if !enabled {
                tracing::info!("Quest '{}' is not enabled in {}", quest.name, country);
            }
            enabled
        });
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    /// Names of quests dropped because their filter failed to compile.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    /// Quests whose filter matches `record`, in catalog order.
    pub fn matching<'a>(
        &'a self,
        record: &'a ElementRecord,
        reference_date: Date,
    ) -> impl Iterator<Item = &'a Quest> + 'a {
        self.quests
            .iter()
            .filter(move |quest| quest.applies_to(record, reference_date))
    }
}
