use anyhow::Result;
use serde::Serialize;

use crate::record::ElementKind;

pub mod jsonl;

pub use self::jsonl::JsonlSink;

/// One (quest, element) hit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuestMatch {
    pub quest: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: i64,
}

pub trait MatchSink: Send {
    fn add_match(&mut self, row: QuestMatch) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
