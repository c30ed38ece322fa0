use crate::error::ParseError;
use crate::types::{OpKind, Operation, PatchFile, Platform, Requirements};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Loads a patch file from disk: reads it, parses it, and inlines any
/// file-backed replacement sources (resolved relative to the patch file's
/// own directory).
pub fn load(path: &Path) -> Result<PatchFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read patch file {:?}", path))?;
    let source_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let (requires, ops) =
        parse(&text, source_dir).with_context(|| format!("in patch file {:?}", path))?;
    Ok(PatchFile {
        name,
        requires,
        ops,
    })
}

/// Parses patch-file text into an ordered operation sequence. Blank lines
/// and `#` comments are skipped; any unknown keyword or malformed token is
/// a `ParseError` carrying the 1-based line number, never silently ignored.
///
/// `source_dir` is only touched to inline `replace <target> <source>`
/// instructions; inline-quoted replacements and the other instruction kinds
/// read nothing.
pub fn parse(
    text: &str,
    source_dir: &Path,
) -> Result<(Requirements, Vec<Operation>), ParseError> {
    let mut requires = Requirements::default();
    let mut ops = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (line, platform) = split_platform_tag(line, line_no)?;
        let (keyword, rest) = split_keyword(line);

        match keyword {
            "requires" => {
                if !ops.is_empty() {
                    return Err(ParseError::MisplacedRequires { line: line_no });
                }
                if platform.is_some() {
                    return Err(bad(line_no, rest, "'requires' takes no platform tag"));
                }
                parse_requires(rest, line_no, &mut requires)?;
            }
            "remove" => {
                let path = single_token(rest, line_no, "remove")?;
                ops.push(Operation {
                    line: line_no,
                    platform,
                    kind: OpKind::Remove { path },
                });
            }
            "replace" => {
                let (target, source) = split_keyword(rest);
                if target.is_empty() || source.is_empty() {
                    return Err(missing(line_no, "replace"));
                }
                let content = if source.starts_with('"') {
                    parse_quoted(source, line_no)?
                } else {
                    let source = single_token(source, line_no, "replace")?;
                    let full = source_dir.join(&source);
                    fs::read_to_string(&full).map_err(|e| ParseError::UnreadableSource {
                        line: line_no,
                        source_path: source,
                        reason: e.to_string(),
                    })?
                };
                ops.push(Operation {
                    line: line_no,
                    platform,
                    kind: OpKind::Replace {
                        path: target.to_string(),
                        content,
                    },
                });
            }
            "set" => {
                let (target, assignment) = split_keyword(rest);
                if target.is_empty() || assignment.is_empty() {
                    return Err(missing(line_no, "set"));
                }
                let (key, value) = parse_assignment(assignment, line_no)?;
                ops.push(Operation {
                    line: line_no,
                    platform,
                    kind: OpKind::SetConfig {
                        path: target.to_string(),
                        key,
                        value,
                    },
                });
            }
            other => {
                return Err(ParseError::UnknownKeyword {
                    line: line_no,
                    keyword: other.to_string(),
                });
            }
        }
    }

    Ok((requires, ops))
}

fn bad(line: usize, token: &str, reason: &str) -> ParseError {
    ParseError::BadToken {
        line,
        token: token.to_string(),
        reason: reason.to_string(),
    }
}

fn missing(line: usize, keyword: &str) -> ParseError {
    ParseError::MissingArgument {
        line,
        keyword: keyword.to_string(),
    }
}

fn split_keyword(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim_start()),
        None => (line, ""),
    }
}

/// Detaches a trailing `@windows` / `@linux` / `@macos` tag. A last token
/// starting with `@` but containing non-alphanumeric characters is left in
/// place (it may be quoted content), and a purely alphanumeric tag that is
/// not a known platform is an error rather than a silent skip.
fn split_platform_tag(line: &str, line_no: usize) -> Result<(&str, Option<Platform>), ParseError> {
    if let Some((head, tail)) = line.rsplit_once(char::is_whitespace) {
        if let Some(tag) = tail.strip_prefix('@') {
            if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                let platform = Platform::from_tag(tag)
                    .ok_or_else(|| bad(line_no, tail, "unknown platform tag"))?;
                return Ok((head.trim_end(), Some(platform)));
            }
        }
    }
    Ok((line, None))
}

fn single_token(rest: &str, line_no: usize, keyword: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        return Err(missing(line_no, keyword));
    }
    if rest.split_whitespace().count() != 1 {
        return Err(bad(line_no, rest, "paths with whitespace are not supported"));
    }
    Ok(rest.to_string())
}

fn parse_requires(
    rest: &str,
    line_no: usize,
    requires: &mut Requirements,
) -> Result<(), ParseError> {
    let (sub, args) = split_keyword(rest);
    match sub {
        "product" => {
            if args.is_empty() {
                return Err(missing(line_no, "requires product"));
            }
            requires
                .products
                .extend(args.split_whitespace().map(str::to_string));
            Ok(())
        }
        "version" => {
            let token = single_token(args, line_no, "requires version")?;
            let components = token
                .split('.')
                .map(|part| part.parse::<u64>())
                .collect::<Result<Vec<u64>, _>>()
                .map_err(|_| bad(line_no, &token, "expected a dotted numeric version"))?;
            requires.min_version = Some(components);
            Ok(())
        }
        "" => Err(missing(line_no, "requires")),
        other => Err(bad(line_no, other, "expected 'product' or 'version'")),
    }
}

/// Parses a double-quoted string with `\n`, `\t`, `\r`, `\"` and `\\`
/// escapes; the closing quote must end the instruction.
fn parse_quoted(input: &str, line_no: usize) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut escaped = false;
    let mut closed = false;
    for c in input.chars().skip(1) {
        if closed {
            if c.is_whitespace() {
                continue;
            }
            return Err(bad(line_no, input, "unexpected text after closing quote"));
        }
        if escaped {
            let replacement = match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '"' => '"',
                '\\' => '\\',
                other => {
                    return Err(bad(
                        line_no,
                        &format!("\\{}", other),
                        "unknown escape sequence",
                    ));
                }
            };
            out.push(replacement);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            closed = true;
        } else {
            out.push(c);
        }
    }
    if !closed {
        return Err(bad(line_no, input, "unterminated quoted string"));
    }
    Ok(out)
}

fn parse_assignment(assignment: &str, line_no: usize) -> Result<(Vec<String>, Value), ParseError> {
    let (key, raw_value) = assignment
        .split_once('=')
        .ok_or_else(|| bad(line_no, assignment, "expected key=value"))?;
    let key = key.trim();
    let segments: Vec<String> = key.split('.').map(str::to_string).collect();
    if key.is_empty() || segments.iter().any(String::is_empty) {
        return Err(bad(line_no, key, "empty key segment"));
    }
    let raw_value = raw_value.trim();
    if raw_value.is_empty() {
        return Err(bad(line_no, assignment, "expected a value after '='"));
    }
    // JSON scalars keep their type; anything that is not valid JSON is
    // taken as a bare string.
    let value = serde_json::from_str::<Value>(raw_value)
        .unwrap_or_else(|_| Value::String(raw_value.to_string()));
    Ok((segments, value))
}
