use crate::error::PathEscapeError;
use crate::types::{Action, OpKind, PatchFile, ResolvedOp, Target, TargetState};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// `${app}` at the start of a logical path expands to the application
/// bundle directory under the root.
const APP_PLACEHOLDER: &str = "${app}";
const APP_DIR: &str = "resources/app";

/// The absolute installation directory every logical path is resolved
/// against. Threaded explicitly through resolver, executor and emitter;
/// there is no ambient working directory.
#[derive(Debug, Clone)]
pub struct InstallationRoot(PathBuf);

impl InstallationRoot {
    pub fn open(path: &Path) -> Result<Self> {
        let absolute = fs::canonicalize(path)
            .with_context(|| format!("installation root {:?} is not accessible", path))?;
        if !absolute.is_dir() {
            bail!("installation root {:?} is not a directory", absolute);
        }
        Ok(InstallationRoot(absolute))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Resolves a logical path to a concrete target. Normalization is
    /// lexical: `.` is dropped, `..` pops, and popping past the root (or an
    /// absolute logical path, or a path naming the root itself) is a
    /// `PathEscapeError`. The only I/O is the final existence check.
    pub fn resolve(&self, logical: &str) -> Result<Target, PathEscapeError> {
        let expanded = match logical.strip_prefix(APP_PLACEHOLDER) {
            Some(rest) => format!("{}{}", APP_DIR, rest),
            None => logical.to_string(),
        };

        let mut relative = PathBuf::new();
        for component in Path::new(&expanded).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        return Err(PathEscapeError {
                            logical: logical.to_string(),
                        });
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathEscapeError {
                        logical: logical.to_string(),
                    });
                }
            }
        }
        if relative.as_os_str().is_empty() {
            return Err(PathEscapeError {
                logical: logical.to_string(),
            });
        }

        let absolute = self.0.join(&relative);
        let state = target_state(&absolute);

        Ok(Target {
            logical: logical.to_string(),
            relative,
            absolute,
            state,
        })
    }
}

/// Existence metadata without following symlinks: a symlink counts as a
/// file whatever it points at (removing it unlinks the link, even a
/// dangling or directory-pointing one).
pub fn target_state(path: &Path) -> TargetState {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => TargetState::File,
        Ok(meta) if meta.is_dir() => TargetState::Dir,
        Ok(_) => TargetState::File,
        Err(_) => TargetState::Missing,
    }
}

/// Resolves every operation of every patch file, preserving order. The
/// first escaping path fails the whole batch, before anything is mutated.
pub fn resolve_all(
    root: &InstallationRoot,
    files: &[PatchFile],
) -> Result<Vec<ResolvedOp>, PathEscapeError> {
    let mut resolved = Vec::new();
    for file in files {
        for op in &file.ops {
            let action = match &op.kind {
                OpKind::Remove { path } => Action::Remove {
                    target: root.resolve(path)?,
                },
                OpKind::Replace { path, content } => Action::Replace {
                    target: root.resolve(path)?,
                    content: content.clone(),
                },
                OpKind::SetConfig { path, key, value } => Action::SetConfig {
                    target: root.resolve(path)?,
                    key: key.clone(),
                    value: value.clone(),
                },
            };
            resolved.push(ResolvedOp {
                patch: file.name.clone(),
                platform: op.platform,
                action,
            });
        }
    }
    Ok(resolved)
}
