//! Row-based segmentation for tabular input

use super::{Segment, Segmenter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tabular row treated as a logical document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDocument {
    pub source_id: String,
    /// 0-based row number within its file
    pub row: usize,
    /// Column name and rendered value, in column order
    pub fields: Vec<(String, String)>,
    /// Explicit question/thesis for this row, used verbatim as its intent
    pub question: Option<String>,
}

impl RowDocument {
    /// Build a row from a JSON object. `id_field` names the column holding the
    /// source identifier (falling back to `<default_source>#<row>`), and
    /// `question_field` the column holding an explicit question. Both columns
    /// are excluded from the row text. Returns `None` for non-object values.
    pub fn from_json(
        default_source: &str,
        row: usize,
        value: &Value,
        id_field: Option<&str>,
        question_field: Option<&str>,
    ) -> Option<Self> {
        let object = value.as_object()?;

        let source_id = id_field
            .and_then(|field| object.get(field))
            .and_then(render_value)
            .unwrap_or_else(|| format!("{}#{}", default_source, row));

        let question = question_field
            .and_then(|field| object.get(field))
            .and_then(render_value)
            .filter(|q| !q.trim().is_empty());

        let fields = object
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != id_field && Some(key.as_str()) != question_field)
            .filter_map(|(key, value)| render_value(value).map(|v| (key.clone(), v)))
            .collect();

        Some(Self {
            source_id,
            row,
            fields,
            question,
        })
    }

    /// Row text as `column: value` lines
    pub fn combined_text(&self) -> String {
        self.fields
            .iter()
            .map(|(column, value)| format!("{}: {}", column, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|(c, _)| c.clone()).collect()
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => Some(other.to_string()),
    }
}

/// A chunk derived from a row, with row provenance
#[derive(Debug, Clone, PartialEq)]
pub struct RowSegment {
    pub segment: Segment,
    pub row: usize,
    pub columns: Vec<String>,
    /// Explicit intents; `None` means intents should be generated
    pub intents: Option<Vec<String>>,
}

impl Segmenter {
    /// Segment one row. Rows that fit become a single chunk; longer rows
    /// degrade to the configured text strategy.
    pub fn segment_row(&self, row: &RowDocument) -> Vec<RowSegment> {
        let columns = row.columns();
        let intents = row.question.as_ref().map(|q| vec![q.clone()]);

        self.segment(&row.combined_text())
            .into_iter()
            .map(|segment| RowSegment {
                segment,
                row: row.row,
                columns: columns.clone(),
                intents: intents.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use serde_json::json;

    fn segmenter(max: usize) -> Segmenter {
        Segmenter::new(&ChunkingConfig {
            max_chunk_size: max,
            overlap: 20,
            min_chunk_size: 10,
            ..ChunkingConfig::default()
        })
    }

    #[test]
    fn test_from_json_extracts_fields() {
        let value = json!({
            "id": "faq-7",
            "answer": "Restart the service after editing the file.",
            "category": "ops",
            "question": "How do I apply config changes?",
            "votes": 12,
            "draft": null
        });
        let row = RowDocument::from_json("faq.jsonl", 3, &value, Some("id"), Some("question")).unwrap();

        assert_eq!(row.source_id, "faq-7");
        assert_eq!(row.row, 3);
        assert_eq!(row.question.as_deref(), Some("How do I apply config changes?"));
        assert_eq!(row.columns(), vec!["answer", "category", "votes"]);
        assert!(row.combined_text().contains("votes: 12"));
        assert!(!row.combined_text().contains("faq-7"));
    }

    #[test]
    fn test_fields_keep_source_column_order() {
        let value: Value =
            serde_json::from_str(r#"{"zone": "eu-west", "host": "db-2", "metric": "latency", "avg": 41}"#).unwrap();
        let row = RowDocument::from_json("metrics.jsonl", 0, &value, None, None).unwrap();

        assert_eq!(row.columns(), vec!["zone", "host", "metric", "avg"]);
        assert_eq!(
            row.combined_text(),
            "zone: eu-west\nhost: db-2\nmetric: latency\navg: 41"
        );
    }

    #[test]
    fn test_from_json_default_source_and_non_object() {
        let row = RowDocument::from_json("data.jsonl", 0, &json!({"text": "hello world"}), Some("id"), None)
            .unwrap();
        assert_eq!(row.source_id, "data.jsonl#0");
        assert!(row.question.is_none());

        assert!(RowDocument::from_json("data.jsonl", 1, &json!([1, 2]), None, None).is_none());
    }

    #[test]
    fn test_question_reused_for_every_chunk() {
        let long_answer = "Each step of the rollout is checked by the operator. ".repeat(20);
        let row = RowDocument {
            source_id: "runbook".into(),
            row: 0,
            fields: vec![("answer".into(), long_answer)],
            question: Some("How is a rollout verified?".into()),
        };

        let segments = segmenter(300).segment_row(&row);
        assert!(segments.len() > 1);
        for segment in &segments {
            assert_eq!(
                segment.intents.as_deref(),
                Some(&["How is a rollout verified?".to_string()][..])
            );
            assert_eq!(segment.columns, vec!["answer"]);
        }
    }

    #[test]
    fn test_short_row_single_chunk_without_intents() {
        let row = RowDocument {
            source_id: "r".into(),
            row: 4,
            fields: vec![
                ("name".into(), "widget".into()),
                ("color".into(), "blue".into()),
            ],
            question: None,
        };
        let segments = segmenter(300).segment_row(&row);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment.text, "name: widget\ncolor: blue");
        assert!(segments[0].intents.is_none());
        assert_eq!(segments[0].row, 4);
    }
}
