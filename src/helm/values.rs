use std::path::Path;

use serde_yaml::{Mapping, Value};

use super::RenderError;

/// Helm refuses list indexes past this bound; so do we.
const MAX_INDEX: usize = 65_536;

/// One step of a `--set` key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Build the final values: chart defaults, then the profile values file,
/// then `key=value` overrides in order. Later sources win.
pub fn merge_values(
    chart_defaults: &Path,
    profile_values: Option<&Path>,
    overrides: &[String],
) -> Result<Value, RenderError> {
    let mut merged = if chart_defaults.is_file() {
        read_values_file(chart_defaults).map_err(RenderError::ChartInvalid)?
    } else {
        Value::Mapping(Mapping::new())
    };

    if let Some(path) = profile_values {
        let overlay = read_values_file(path).map_err(RenderError::ProfileInvalid)?;
        coalesce(&mut merged, overlay);
    }

    for expr in overrides {
        apply_set(&mut merged, expr)
            .map_err(|e| RenderError::RenderFailed(format!("override {expr:?}: {e}")))?;
    }
    Ok(merged)
}

/// Parse a YAML values file; an empty file is an empty mapping.
pub fn read_values_file(path: &Path) -> Result<Value, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let value: Value =
        serde_yaml::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))?;
    match value {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(value),
        _ => Err(format!("{}: values must be a mapping", path.display())),
    }
}

/// Deep-merge `overlay` into `base`. Mappings merge key by key, anything else
/// replaces, and a null in the overlay deletes the key.
pub fn coalesce(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    base_map.remove(&key);
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_mapping() && value.is_mapping() => {
                        coalesce(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply one `--set` expression, which may hold several comma-separated
/// assignments.
pub fn apply_set(values: &mut Value, expr: &str) -> Result<(), String> {
    for (path, value) in parse_set(expr)? {
        set_path(values, &path, value)?;
    }
    Ok(())
}

/// Parse `a.b=1,list[0].name=x,tags={a,b}` into path/value pairs.
///
/// A backslash escapes the next character, so `a\.b=1` sets the key `a.b`.
/// Scalars are typed the way Helm types `--set` values: `true`, `false`,
/// `null` and integers become YAML booleans, null and numbers, everything
/// else stays a string.
pub fn parse_set(expr: &str) -> Result<Vec<(Vec<PathSegment>, Value)>, String> {
    let mut out = Vec::new();
    for assignment in split_unescaped(expr, ',', true) {
        if assignment.is_empty() {
            continue;
        }
        let (key, raw) = split_once_unescaped(&assignment, '=')
            .ok_or_else(|| format!("{assignment:?} is not a key=value pair"))?;
        let path = parse_path(&key)?;
        let value = if raw.starts_with('{') && raw.ends_with('}') && raw.len() >= 2 {
            let inner = &raw[1..raw.len() - 1];
            Value::Sequence(
                split_unescaped(inner, ',', false)
                    .iter()
                    .filter(|item| !item.is_empty())
                    .map(|item| typed_scalar(&unescape(item)))
                    .collect(),
            )
        } else {
            typed_scalar(&unescape(&raw))
        };
        out.push((path, value));
    }
    Ok(out)
}

fn typed_scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => match raw.parse::<i64>() {
            // keep leading zeros ("007") as strings
            Ok(n) if !(raw.len() > 1 && raw.starts_with('0')) => Value::Number(n.into()),
            _ => Value::String(raw.to_string()),
        },
    }
}

/// Split on `sep` outside escapes (and outside `{...}` when `braces` is set).
/// Escapes are preserved for later stages.
fn split_unescaped(input: &str, sep: char, braces: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '{' if braces => {
                depth += 1;
                current.push(c);
            }
            '}' if braces => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn split_once_unescaped(input: &str, sep: char) -> Option<(String, String)> {
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            return Some((input[..i].to_string(), input[i + c.len_utf8()..].to_string()));
        }
    }
    None
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_path(key: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = key.chars().peekable();
    // true right after `]`, where a bare key is not allowed without a dot
    let mut after_index = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let next = chars.next().ok_or("key ends with a dangling escape")?;
                current.push(next);
            }
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                } else if !after_index {
                    return Err(format!("empty key segment in {key:?}"));
                }
                after_index = false;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                } else if segments.is_empty() {
                    return Err(format!("{key:?} starts with a list index"));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        _ => return Err(format!("malformed list index in {key:?}")),
                    }
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| format!("malformed list index in {key:?}"))?;
                if index > MAX_INDEX {
                    return Err(format!("list index {index} exceeds {MAX_INDEX}"));
                }
                segments.push(PathSegment::Index(index));
                after_index = true;
            }
            c => {
                if after_index {
                    return Err(format!("expected '.' or '[' after index in {key:?}"));
                }
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    } else if !after_index {
        return Err(format!("empty key segment in {key:?}"));
    }
    Ok(segments)
}

fn set_path(node: &mut Value, path: &[PathSegment], value: Value) -> Result<(), String> {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return Ok(());
    };
    match head {
        PathSegment::Key(key) => {
            if !node.is_mapping() {
                *node = Value::Mapping(Mapping::new());
            }
            if let Value::Mapping(map) = node {
                let key = Value::String(key.clone());
                if !map.contains_key(&key) {
                    map.insert(key.clone(), Value::Null);
                }
                if let Some(child) = map.get_mut(&key) {
                    set_path(child, rest, value)?;
                }
            }
        }
        PathSegment::Index(index) => {
            if !node.is_sequence() {
                *node = Value::Sequence(Vec::new());
            }
            if let Value::Sequence(seq) = node {
                if seq.len() <= *index {
                    seq.resize(index + 1, Value::Null);
                }
                set_path(&mut seq[*index], rest, value)?;
            }
        }
    }
    Ok(())
}
