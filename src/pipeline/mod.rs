use anyhow::{Context, Result};
use std::sync::Arc;
use time::Date;

use crate::quest::QuestCatalog;
use crate::record::ElementRecord;
use crate::sinks::QuestMatch;

/// A run of consecutive input lines; `first_line` is 1-based.
#[derive(Debug, Clone)]
pub struct LineBatch {
    pub first_line: usize,
    pub lines: Vec<String>,
}

/// What one batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub matches: Vec<QuestMatch>,
    pub records: u64,
    pub malformed: u64,
}

/// Evaluates every quest of the catalog against decoded records.
pub struct RecordProcessor {
    pub catalog: Arc<QuestCatalog>,
    pub reference_date: Date,
}

impl RecordProcessor {
    pub fn new(catalog: Arc<QuestCatalog>, reference_date: Date) -> Self {
        Self {
            catalog,
            reference_date,
        }
    }

    pub fn process_record(&self, record: &ElementRecord, out: &mut Vec<QuestMatch>) {
        for quest in self.catalog.matching(record, self.reference_date) {
            out.push(QuestMatch {
                quest: quest.name.clone(),
                kind: record.kind,
                id: record.id,
            });
        }
    }

    pub fn process_line(&self, line: &str) -> Result<Vec<QuestMatch>> {
        let record: ElementRecord =
            serde_json::from_str(line).context("Pipeline: Invalid element record")?;
        let mut matches = Vec::new();
        self.process_record(&record, &mut matches);
        Ok(matches)
    }

    /// Blank lines are ignored; malformed lines are logged and counted.
    pub fn process_batch(&self, batch: LineBatch) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (offset, line) in batch.lines.iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.process_line(line) {
                Ok(matches) => {
                    outcome.records += 1;
                    outcome.matches.extend(matches);
                }
                Err(err) => {
                    outcome.malformed += 1;
                    tracing::warn!(
                        "Pipeline: Skipping malformed record on line {}: {:#}",
                        batch.first_line + offset,
                        err
                    );
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuestsConfig;
    use crate::record::ElementKind;
    use time::macros::date;

    fn processor() -> RecordProcessor {
        let config = QuestsConfig::from_yaml_str(
            r#"
quests:
  - name: shelter
    filter: nodes with highway = bus_stop and !shelter
  - name: tactile_paving
    filter: nodes, ways with highway = bus_stop and (!tactile_paving or tactile_paving older today -8 years)
"#,
        )
        .unwrap();
        let catalog = QuestCatalog::compile(&config, true).unwrap();
        RecordProcessor::new(Arc::new(catalog), date!(2024 - 01 - 01))
    }

    #[test]
    fn test_process_line() {
        let matches = processor()
            .process_line(r#"{"type":"node","id":5,"tags":{"highway":"bus_stop"}}"#)
            .unwrap();
        assert_eq!(
            matches,
            vec![
                QuestMatch {
                    quest: "shelter".into(),
                    kind: ElementKind::Node,
                    id: 5,
                },
                QuestMatch {
                    quest: "tactile_paving".into(),
                    kind: ElementKind::Node,
                    id: 5,
                },
            ]
        );
    }

    #[test]
    fn test_process_line_rejects_garbage() {
        assert!(processor().process_line("{not json").is_err());
    }

    #[test]
    fn test_process_batch_counts() {
        let batch = LineBatch {
            first_line: 1,
            lines: vec![
                r#"{"type":"way","id":1,"tags":{"highway":"bus_stop","tactile_paving":"no","check_date:tactile_paving":"2010-01-01"}}"#.into(),
                String::new(),
                "garbage".into(),
                r#"{"type":"relation","id":2,"tags":{"highway":"bus_stop"}}"#.into(),
            ],
        };
        let outcome = processor().process_batch(batch);
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.malformed, 1);
        assert_eq!(
            outcome.matches,
            vec![QuestMatch {
                quest: "tactile_paving".into(),
                kind: ElementKind::Way,
                id: 1,
            }]
        );
    }
}
