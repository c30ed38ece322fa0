use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub const PRODUCT_JSON: &str = "resources/app/product.json";
pub const PACKAGE_JSON: &str = "resources/app/package.json";

/// Identity of the installed application, read from its own metadata
/// files. Probing fails if the directory is not a real installation, which
/// aborts the run before any patch file is even parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallInfo {
    pub product: String,
    pub version: String,
}

impl InstallInfo {
    pub fn probe(root: &Path) -> Result<InstallInfo> {
        let product = read_string_field(&root.join(PRODUCT_JSON), "nameShort")?;
        let version = read_string_field(&root.join(PACKAGE_JSON), "version")?;
        Ok(InstallInfo { product, version })
    }
}

fn read_string_field(path: &Path, field: &str) -> Result<String> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    let json: Value = serde_json::from_str(&text)
        .with_context(|| format!("{:?} is not valid JSON", path))?;
    json.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("{:?} has no string field '{}'", path, field))
}
