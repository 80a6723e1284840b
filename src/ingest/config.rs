// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_KEYWORDS_PATH: &str = "MONITOR_KEYWORDS_PATH";

/// Load keywords from an explicit path. Supports TOML (`keywords = [...]`) or a JSON array.
pub fn load_keywords_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keywords from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

/// Keyword files in lookup order:
/// 1) `path`, normally from $MONITOR_KEYWORDS_PATH (must exist and list something)
/// 2) config/keywords.toml
/// 3) config/keywords.json
///
/// Returns an empty list when neither an explicit path nor a config file is present.
pub fn load_keywords_files(path: Option<&Path>) -> Result<Vec<String>> {
    if let Some(p) = path {
        if !p.exists() {
            return Err(anyhow!("{ENV_KEYWORDS_PATH} points to non-existent path"));
        }
        let v = load_keywords_from(p)?;
        if v.is_empty() {
            return Err(anyhow!("keyword file {} is empty", p.display()));
        }
        return Ok(v);
    }
    for fallback in ["config/keywords.toml", "config/keywords.json"] {
        let pb = PathBuf::from(fallback);
        if pb.exists() {
            return load_keywords_from(&pb);
        }
    }
    Ok(Vec::new())
}

/// Split a comma-separated list (the `MONITOR_KEYWORDS` format).
pub fn parse_keyword_list(s: &str) -> Vec<String> {
    clean_list(s.split(',').map(str::to_string))
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("keywords");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keywords format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlKeywords {
        keywords: Vec<String>,
    }
    let v: TomlKeywords = toml::from_str(s)?;
    Ok(clean_list(v.keywords))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop blanks and duplicates. Keeps first-seen order: keywords run in configured order.
fn clean_list(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|k| k == t) {
            out.push(t.to_string());
        }
    }
    out
}
