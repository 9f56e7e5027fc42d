//! Subcommand implementations

pub mod experiments;
pub mod recommend;
pub mod summarize;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read a JSON document holding either one record or an array of records
pub async fn load_documents<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_documents(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_documents<T: DeserializeOwned>(content: &str) -> Result<Vec<T>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let records = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_lib::Experiment;

    #[test]
    fn test_single_and_array_documents() {
        let single: Vec<Experiment> = parse_documents(r#"{"experiment_name": "a"}"#).unwrap();
        assert_eq!(single.len(), 1);

        let many: Vec<Experiment> =
            parse_documents(r#"[{"experiment_name": "a"}, {"experiment_name": "b"}]"#).unwrap();
        assert_eq!(many[1].name(), "b");

        assert!(parse_documents::<Experiment>("not json").is_err());
    }
}
