use std::path::Path;

use anyhow::Context as _;

use crate::value::SourceDocument;

/// Parses one `SourceDocument` per non-blank line.
pub fn parse_jsonl(content: &str) -> anyhow::Result<Vec<SourceDocument>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<SourceDocument>(line)
                .with_context(|| format!("invalid document on line {}", i + 1))
        })
        .collect()
}

pub async fn read_jsonl(path: impl AsRef<Path>) -> anyhow::Result<Vec<SourceDocument>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("tokio::fs::read_to_string {} failed", path.display()))?;
    parse_jsonl(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_field_aliases_and_blank_lines() {
        let docs = parse_jsonl(
            r#"{"source_id": "a", "text": "alpha", "tags": ["cardiology"]}

{"id": "b", "content": "beta"}
"#,
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].tags.contains("cardiology"));
        assert_eq!(docs[1].source_id, "b");
        assert_eq!(docs[1].text, "beta");
    }

    #[test]
    fn reports_line_of_bad_document() {
        let err = parse_jsonl("{\"id\": \"a\", \"text\": \"x\"}\n{oops}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
