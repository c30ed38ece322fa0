use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    Macos,
}

impl Platform {
    pub fn from_tag(tag: &str) -> Option<Platform> {
        match tag {
            "windows" => Some(Platform::Windows),
            "linux" => Some(Platform::Linux),
            "macos" => Some(Platform::Macos),
            _ => None,
        }
    }

    /// Platform of the machine running the tool, `None` on anything exotic.
    pub fn host() -> Option<Platform> {
        Platform::from_tag(std::env::consts::OS)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Macos => "macos",
        };
        write!(f, "{}", name)
    }
}

/// One patch instruction, as written. Immutable once parsed; applying it
/// only ever touches the filesystem or the accumulated results.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// 1-based line number in the patch file, for diagnostics.
    pub line: usize,
    /// Platform this operation targets, `None` for all platforms.
    pub platform: Option<Platform>,
    pub kind: OpKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Delete a file or directory under the installation root, if present.
    Remove { path: String },
    /// Overwrite a file's contents. File-backed sources are inlined at
    /// load time, so the content here is always the final text.
    Replace { path: String, content: String },
    /// Merge one key into a JSON configuration file. The key is a dotted
    /// path, split into segments.
    SetConfig {
        path: String,
        key: Vec<String>,
        value: Value,
    },
}

/// `requires` directives gating a whole patch file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Accepted product names; empty means any product.
    pub products: Vec<String>,
    /// Minimal version as dotted numeric components.
    pub min_version: Option<Vec<u64>>,
}

impl Requirements {
    /// `None` if the probed installation satisfies the requirements,
    /// otherwise a human-readable reason to skip the patch file.
    pub fn unmet_reason(&self, product: &str, version: &str) -> Option<String> {
        if !self.products.is_empty() && !self.products.iter().any(|p| p == product) {
            return Some(format!("'{}' is not supported by this patch", product));
        }
        if let Some(min) = &self.min_version {
            let current = parse_version(version);
            for (idx, want) in min.iter().enumerate() {
                let have = current.get(idx).copied().unwrap_or(0);
                if have > *want {
                    break;
                }
                if have < *want {
                    let min_str: Vec<String> = min.iter().map(u64::to_string).collect();
                    return Some(format!(
                        "v{} is older than the required v{}",
                        version,
                        min_str.join(".")
                    ));
                }
            }
        }
        None
    }
}

/// Non-numeric components count as zero, matching the lenient way the
/// probed package version is treated elsewhere.
pub fn parse_version(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.trim().parse().unwrap_or(0))
        .collect()
}

/// An ordered patch file, loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchFile {
    /// File name as given on the command line, used in result lines and
    /// script separators.
    pub name: String,
    pub requires: Requirements,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Missing,
    File,
    Dir,
}

/// A logical path resolved against the installation root.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Path exactly as written in the patch file.
    pub logical: String,
    /// Normalized path relative to the root, placeholder expanded.
    pub relative: PathBuf,
    pub absolute: PathBuf,
    /// Existence metadata captured at resolution time.
    pub state: TargetState,
}

/// An operation ready to execute or to emit as a script command. Shared by
/// the executor and the script emitter so the two stay behaviorally
/// equivalent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOp {
    pub patch: String,
    pub platform: Option<Platform>,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Remove {
        target: Target,
    },
    Replace {
        target: Target,
        content: String,
    },
    SetConfig {
        target: Target,
        key: Vec<String>,
        value: Value,
    },
}

impl Action {
    pub fn target(&self) -> &Target {
        match self {
            Action::Remove { target }
            | Action::Replace { target, .. }
            | Action::SetConfig { target, .. } => target,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Action::Remove { target } => format!("remove {}", target.logical),
            Action::Replace { target, .. } => format!("replace {}", target.logical),
            Action::SetConfig { target, key, value } => {
                format!("set {} {}={}", target.logical, key.join("."), value)
            }
        }
    }
}

/// Outcome of one operation. Failures never stop the run; the driver
/// aggregates them and decides the exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}
