//! Feed file loading.
//!
//! Accepted shapes:
//! - a JSON array of indicator objects
//! - JSON Lines, one indicator object per non-blank line
//!
//! A leading UTF-8 BOM is ignored.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tis_reconcile::Indicator;

pub fn load_feed(path: &Path) -> Result<Vec<Indicator>> {
    let bytes = fs::read(path).with_context(|| format!("read feed failed: {}", path.display()))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = std::str::from_utf8(bytes).context("feed must be UTF-8 text")?;
    parse_feed(raw)
}

pub fn parse_feed(raw: &str) -> Result<Vec<Indicator>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        let items: Vec<Value> =
            serde_json::from_str(trimmed).context("feed JSON array did not parse")?;
        return items
            .into_iter()
            .enumerate()
            .map(|(i, v)| to_indicator(v).with_context(|| format!("feed item {}", i)))
            .collect();
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let v: Value = serde_json::from_str(line.trim())
                .with_context(|| format!("feed line {} is not JSON", i + 1))?;
            to_indicator(v).with_context(|| format!("feed line {}", i + 1))
        })
        .collect()
}

fn to_indicator(v: Value) -> Result<Indicator> {
    Indicator::from_value(v).ok_or_else(|| anyhow!("indicator must be a JSON object"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_skip_blank_lines() {
        let raw = "{\"networkIPv4\":\"203.0.113.1\"}\n\n  \n{\"domainName\":\"evil.example\"}\n";
        let feed = parse_feed(raw).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[1].get("domainName").unwrap(), "evil.example");
    }

    #[test]
    fn json_array_is_accepted() {
        let raw = r#"  [{"a": 1}, {"b": "2"}]"#;
        let feed = parse_feed(raw).unwrap();
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn non_object_line_is_rejected_with_position() {
        let raw = "{\"a\":1}\n[1,2]\n";
        let err = parse_feed(raw).unwrap_err();
        assert!(format!("{err:#}").contains("feed line 2"), "{err:#}");
    }

    #[test]
    fn bom_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"{\"url\":\"http://bad.example/x\"}\n");
        fs::write(&path, bytes).unwrap();

        let feed = load_feed(&path).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].get("url").unwrap(), "http://bad.example/x");
    }

    #[test]
    fn empty_file_is_an_empty_feed() {
        assert!(parse_feed("").unwrap().is_empty());
        assert!(parse_feed("[]").unwrap().is_empty());
    }
}
