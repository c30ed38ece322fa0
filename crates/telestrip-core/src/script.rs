use crate::install::InstallInfo;
use crate::resolver::InstallationRoot;
use crate::types::{Action, Platform, ResolvedOp, Target};
use serde_json::Value;
use std::path::Path;

pub const SCRIPT_PLATFORM: Platform = Platform::Windows;
const ROOT_VAR: &str = "INSTALL_ROOT";

/// Only Windows batch output is supported; anything else must be rejected
/// before the run does any work.
pub fn supported_output(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("bat") | Some("cmd")
    )
}

/// A self-contained batch script reproducing, in order, the same
/// filesystem effects the executor's apply mode would have. Built from the
/// resolved operations (the intended actions), never from their outcomes,
/// and it never references the tool itself.
pub struct BatchScript {
    lines: Vec<String>,
}

impl BatchScript {
    pub fn build(info: &InstallInfo, root: &InstallationRoot, ops: &[ResolvedOp]) -> BatchScript {
        let mut script = BatchScript {
            lines: vec!["@echo off".to_string()],
        };
        let generated = format!(
            "This script was created AUTOMATICALLY by telestrip v{}",
            env!("CARGO_PKG_VERSION")
        );
        let product = format!("for {} v{}.", info.product, info.version);
        script.comment(&[
            generated.as_str(),
            product.as_str(),
            "",
            "Running it reproduces the patch operations listed below without",
            "needing the tool itself. No warranty of any kind.",
        ]);
        script.set_variable(ROOT_VAR, &root.path().display().to_string());

        let mut current_patch = "";
        for op in ops {
            if op.patch != current_patch {
                current_patch = &op.patch;
                let separator = "-".repeat(70);
                script.comment(&[separator.as_str(), current_patch, separator.as_str()]);
            }
            if let Some(platform) = op.platform {
                if platform != SCRIPT_PLATFORM {
                    let note =
                        format!("skipped: {} ({} only)", op.action.describe(), platform);
                    script.comment(&[note.as_str()]);
                    continue;
                }
            }
            match &op.action {
                Action::Remove { target } => script.remove(target),
                Action::Replace { target, content } => script.replace(target, content),
                Action::SetConfig { target, key, value } => {
                    script.set_config(target, key, value)
                }
            }
        }
        script
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    fn comment(&mut self, lines: &[&str]) {
        for line in lines {
            if line.is_empty() {
                self.lines.push("rem".to_string());
            } else {
                self.lines.push(format!("rem {}", line));
            }
        }
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.lines.push(format!("set \"{}={}\"", name, value));
    }

    fn progress(&mut self, message: &str) {
        self.lines.push(format!("echo :: {}", batch_escape(message)));
    }

    fn remove(&mut self, target: &Target) {
        let path = target_expr(target);
        self.progress(&format!("Deleting {}...", target.logical));
        // state on the script's host may differ from state at emission
        // time, so both forms stay guarded
        self.lines.push(format!(
            "if exist \"{path}\\\" (rmdir /S /Q \"{path}\") else if exist \"{path}\" (del /F /Q \"{path}\")",
            path = path
        ));
    }

    fn replace(&mut self, target: &Target, content: &str) {
        let path = target_expr(target);
        self.progress(&format!("Writing {}...", target.logical));
        if let Some(parent) = target.relative.parent() {
            if !parent.as_os_str().is_empty() {
                let parent = format!("%{}%\\{}", ROOT_VAR, windows_path(parent));
                self.lines.push(format!(
                    "if not exist \"{parent}\\\" mkdir \"{parent}\"",
                    parent = parent
                ));
            }
        }
        let mut lines = content.lines().peekable();
        if lines.peek().is_none() {
            self.lines.push(format!("type nul > \"{}\"", path));
            return;
        }
        self.lines.push("(".to_string());
        for line in lines {
            self.lines.push(format!("echo({}", batch_escape(line)));
        }
        self.lines.push(format!(") > \"{}\"", path));
    }

    fn set_config(&mut self, target: &Target, key: &[String], value: &Value) {
        self.progress(&format!(
            "Updating {} ({})...",
            target.logical,
            key.join(".")
        ));
        let mut command = String::new();
        command.push_str(&format!(
            "$p = Join-Path $env:{} '{}'; ",
            ROOT_VAR,
            ps_quote(&windows_path(&target.relative))
        ));
        command.push_str(
            "if (Test-Path $p) { $j = Get-Content -Raw $p | ConvertFrom-Json } \
             else { $j = New-Object psobject }; $o = $j; ",
        );
        if let Some((leaf, parents)) = key.split_last() {
            for segment in parents {
                command.push_str(&format!(
                    "if ($null -eq $o.'{seg}') {{ $o | Add-Member -Force NoteProperty '{seg}' (New-Object psobject) }}; $o = $o.'{seg}'; ",
                    seg = ps_quote(segment)
                ));
            }
            command.push_str(&format!(
                "$o | Add-Member -Force NoteProperty '{}' {}; ",
                ps_quote(leaf),
                ps_value(value)
            ));
        }
        command.push_str("$j | ConvertTo-Json -Depth 64 | Set-Content $p");
        self.lines.push(format!(
            "powershell -NoProfile -Command \"{}\"",
            command.replace('%', "%%")
        ));
    }
}

/// Target path spelled through the script's root variable, with
/// backslashes, so the script keeps working if the installation moved.
fn target_expr(target: &Target) -> String {
    format!("%{}%\\{}", ROOT_VAR, windows_path(&target.relative))
}

fn windows_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<String>>()
        .join("\\")
}

/// Escapes a line for `echo(` inside a parenthesised redirect block.
fn batch_escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '%' => out.push_str("%%"),
            '^' | '&' | '|' | '<' | '>' | '(' | ')' => {
                out.push('^');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn ps_quote(text: &str) -> String {
    text.replace('\'', "''")
}

/// Value as a PowerShell expression. Scalars map to native literals;
/// arrays and objects round-trip through ConvertFrom-Json (their JSON text
/// needs `\"` at the batch level, which cmd passes through to PowerShell).
fn ps_value(value: &Value) -> String {
    match value {
        Value::Null => "$null".to_string(),
        Value::Bool(true) => "$true".to_string(),
        Value::Bool(false) => "$false".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", ps_quote(s)),
        other => format!(
            "('{}' | ConvertFrom-Json)",
            ps_quote(&other.to_string()).replace('"', "\\\"")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ResolvedOp};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn fake_install(dir: &Path) -> (InstallInfo, InstallationRoot) {
        let app = dir.join("resources/app");
        fs::create_dir_all(&app).unwrap();
        fs::write(app.join("product.json"), r#"{"nameShort": "VSCodium"}"#).unwrap();
        fs::write(app.join("package.json"), r#"{"version": "1.102.35058"}"#).unwrap();
        let root = InstallationRoot::open(dir).unwrap();
        let info = InstallInfo::probe(dir).unwrap();
        (info, root)
    }

    fn op(root: &InstallationRoot, patch: &str, logical: &str, make: fn(Target) -> Action) -> ResolvedOp {
        ResolvedOp {
            patch: patch.to_string(),
            platform: None,
            action: make(root.resolve(logical).unwrap()),
        }
    }

    #[test]
    fn test_supported_output_extensions() {
        assert!(supported_output(Path::new("out.bat")));
        assert!(supported_output(Path::new("out.CMD")));
        assert!(!supported_output(Path::new("out.sh")));
        assert!(!supported_output(Path::new("out")));
    }

    #[test]
    fn test_script_header_and_root_variable() {
        let dir = tempdir().unwrap();
        let (info, root) = fake_install(dir.path());
        let text = BatchScript::build(&info, &root, &[]).text();

        assert!(text.starts_with("@echo off\n"));
        assert!(text.contains("rem This script was created AUTOMATICALLY by telestrip"));
        assert!(text.contains("for VSCodium v1.102.35058."));
        assert!(text.contains(&format!("set \"INSTALL_ROOT={}\"", root.path().display())));
    }

    #[test]
    fn test_remove_emits_guarded_delete() {
        let dir = tempdir().unwrap();
        let (info, root) = fake_install(dir.path());
        let ops = vec![op(&root, "strip.patch", "locales/am.pak", |target| {
            Action::Remove { target }
        })];
        let text = BatchScript::build(&info, &root, &ops).text();

        assert!(text.contains("rem strip.patch"));
        assert!(text.contains("echo :: Deleting locales/am.pak..."));
        assert!(text.contains("rmdir /S /Q \"%INSTALL_ROOT%\\locales\\am.pak\""));
        assert!(text.contains("del /F /Q \"%INSTALL_ROOT%\\locales\\am.pak\""));
    }

    #[test]
    fn test_replace_emits_echo_block() {
        let dir = tempdir().unwrap();
        let (info, root) = fake_install(dir.path());
        let ops = vec![op(&root, "p.patch", "resources/app/t.js", |target| {
            Action::Replace {
                target,
                content: "a & b\n100%\n".to_string(),
            }
        })];
        let text = BatchScript::build(&info, &root, &ops).text();

        assert!(text.contains("if not exist \"%INSTALL_ROOT%\\resources\\app\\\" mkdir"));
        assert!(text.contains("echo(a ^& b"));
        assert!(text.contains("echo(100%%"));
        assert!(text.contains(") > \"%INSTALL_ROOT%\\resources\\app\\t.js\""));
    }

    #[test]
    fn test_set_config_emits_powershell_merge() {
        let dir = tempdir().unwrap();
        let (info, root) = fake_install(dir.path());
        let ops = vec![op(&root, "p.patch", "config/settings.json", |target| {
            Action::SetConfig {
                target,
                key: vec!["telemetry".to_string(), "enabled".to_string()],
                value: json!(false),
            }
        })];
        let text = BatchScript::build(&info, &root, &ops).text();

        assert!(text.contains("powershell -NoProfile -Command"));
        assert!(text.contains("Join-Path $env:INSTALL_ROOT 'config\\settings.json'"));
        assert!(text.contains("'telemetry'"));
        assert!(text.contains("NoteProperty 'enabled' $false"));
        assert!(text.contains("ConvertTo-Json"));
    }

    #[test]
    fn test_non_windows_operations_are_omitted() {
        let dir = tempdir().unwrap();
        let (info, root) = fake_install(dir.path());
        let mut removal = op(&root, "p.patch", "cache", |target| Action::Remove { target });
        removal.platform = Some(Platform::Linux);
        let text = BatchScript::build(&info, &root, &[removal]).text();

        assert!(!text.contains("rmdir"));
        assert!(text.contains("rem skipped: remove cache (linux only)"));
    }

    #[test]
    fn test_operations_keep_patch_order() {
        let dir = tempdir().unwrap();
        let (info, root) = fake_install(dir.path());
        let ops = vec![
            op(&root, "a.patch", "one.txt", |target| Action::Remove { target }),
            op(&root, "b.patch", "two.txt", |target| Action::Remove { target }),
        ];
        let text = BatchScript::build(&info, &root, &ops).text();

        let first = text.find("Deleting one.txt").unwrap();
        let second = text.find("Deleting two.txt").unwrap();
        assert!(first < second);
        assert!(text.find("rem a.patch").unwrap() < text.find("rem b.patch").unwrap());
    }
}
