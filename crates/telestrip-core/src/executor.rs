use crate::resolver::target_state;
use crate::types::{Action, Outcome, Platform, ResolvedOp, Target, TargetState};
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Applies one resolved operation. In dry-run mode everything (including
/// the JSON merge) is still computed, but nothing on disk changes and the
/// outcome is the one the real run would report. I/O failures come back as
/// `Outcome::Failed` so the caller can keep going with later operations.
pub fn apply(op: &ResolvedOp, dry_run: bool, host: Option<Platform>) -> Outcome {
    if let Some(wanted) = op.platform {
        if host != Some(wanted) {
            return Outcome::Skipped("platform mismatch".to_string());
        }
    }
    match &op.action {
        Action::Remove { target } => remove(target, dry_run),
        Action::Replace { target, content } => replace(target, content, dry_run),
        Action::SetConfig { target, key, value } => {
            set_config(target, key, value.clone(), dry_run)
        }
    }
}

/// Resolution-time metadata goes stale once earlier operations in the same
/// run mutate the tree, so a real run re-probes the target; a dry run never
/// mutates anything and keeps the snapshot.
fn current_state(target: &Target, dry_run: bool) -> TargetState {
    if dry_run {
        target.state
    } else {
        target_state(&target.absolute)
    }
}

fn remove(target: &Target, dry_run: bool) -> Outcome {
    let result = match current_state(target, dry_run) {
        TargetState::Missing => return Outcome::Skipped("not found".to_string()),
        _ if dry_run => Ok(()),
        TargetState::File => fs::remove_file(&target.absolute),
        TargetState::Dir => fs::remove_dir_all(&target.absolute),
    };
    match result {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

fn replace(target: &Target, content: &str, dry_run: bool) -> Outcome {
    if current_state(target, dry_run) == TargetState::Dir {
        return Outcome::Failed("target is a directory".to_string());
    }
    if dry_run {
        return Outcome::Applied;
    }
    if let Err(e) = create_parent(&target.absolute) {
        return Outcome::Failed(e);
    }
    match fs::write(&target.absolute, content) {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

fn set_config(target: &Target, key: &[String], value: Value, dry_run: bool) -> Outcome {
    let mut document = match current_state(target, dry_run) {
        TargetState::Missing => Value::Object(Map::new()),
        TargetState::Dir => return Outcome::Failed("target is a directory".to_string()),
        TargetState::File => {
            let text = match fs::read_to_string(&target.absolute) {
                Ok(text) => text,
                Err(e) => return Outcome::Failed(e.to_string()),
            };
            match serde_json::from_str::<Value>(&text) {
                Ok(json @ Value::Object(_)) => json,
                Ok(_) => return Outcome::Failed("existing file is not a JSON object".to_string()),
                Err(e) => return Outcome::Failed(format!("existing file is not valid JSON: {}", e)),
            }
        }
    };

    merge_key(&mut document, key, value);
    debug!("merged configuration for {}: {}", target.logical, document);

    if dry_run {
        return Outcome::Applied;
    }
    if let Err(e) = create_parent(&target.absolute) {
        return Outcome::Failed(e);
    }
    let mut text = match serde_json::to_string_pretty(&document) {
        Ok(text) => text,
        Err(e) => return Outcome::Failed(e.to_string()),
    };
    text.push('\n');
    match fs::write(&target.absolute, text) {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

fn create_parent(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {:?}: {}", parent, e))?;
    }
    Ok(())
}

/// Assigns `value` at the dotted key path inside `document`, creating
/// intermediate objects and overwriting intermediate non-objects. Last
/// write wins within a run.
pub fn merge_key(document: &mut Value, key: &[String], value: Value) {
    let Some((leaf, parents)) = key.split_last() else {
        return;
    };
    let mut node = document;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let map = match node {
            Value::Object(map) => map,
            _ => return,
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(leaf.clone(), value);
    }
}
