use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// `KEY=value` pairs from `<app_root>/.env`; empty when the file is absent.
pub(super) fn load_dotenv_map(app_root: &Path) -> io::Result<HashMap<String, String>> {
    let path = app_root.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    Ok(parse_dotenv_content(&fs::read_to_string(path)?))
}

pub(super) fn parse_dotenv_content(raw: &str) -> HashMap<String, String> {
    raw.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    let value = if quoted {
        &value[1..value.len() - 1]
    } else {
        value.split_once(" #").map_or(value, |(before, _)| before.trim_end())
    };
    Some((key.to_string(), value.to_string()))
}
