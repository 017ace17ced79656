//! Downloader command extraction from preset shell scripts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PanelConfig;
use crate::error::{CatalogError, ValidationError};
use crate::resolver::TransferSpec;

/// Collect the downloader commands in a script. A line starting with the
/// program name opens a command; lines ending in `\` continue it. Comments
/// and blank lines are skipped.
pub fn extract_commands(contents: &str, program: &str) -> Vec<String> {
    let program = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    let mut commands = Vec::new();
    let mut current: Option<String> = None;
    let mut continues = false;

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (body, trailing_backslash) = match line.strip_suffix('\\') {
            Some(body) => (body.trim_end(), true),
            None => (line, false),
        };
        let starts_command = body
            .strip_prefix(program)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace));

        if starts_command {
            commands.extend(current.take());
            current = Some(body.to_string());
        } else if continues {
            if let Some(cmd) = current.as_mut() {
                cmd.push(' ');
                cmd.push_str(body);
            }
        } else {
            commands.extend(current.take());
        }
        continues = trailing_backslash && current.is_some();
    }
    commands.extend(current);
    commands
}

/// Split a command line into words, honoring single and double quotes.
pub fn split_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    word.push(next);
                }
            }
            (Some(_), c) => word.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    word.push(next);
                    in_word = true;
                }
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            (None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

/// Build a transfer spec from one downloader command. `-d`/`--dir` and
/// `-o`/`--out` become the destination; the first http(s) word is the
/// locator; everything else is passed through as extra options.
pub fn spec_from_command(
    command: &str,
    config: &PanelConfig,
) -> Result<TransferSpec, ValidationError> {
    let words = split_words(command);
    let mut dir: Option<String> = None;
    let mut out: Option<String> = None;
    let mut locator: Option<String> = None;
    let mut extra = Vec::new();

    let mut it = words.into_iter().skip(1);
    while let Some(word) = it.next() {
        match word.as_str() {
            "-d" | "--dir" => dir = it.next(),
            "-o" | "--out" => out = it.next(),
            w if w.starts_with("--dir=") => dir = Some(w["--dir=".len()..].to_string()),
            w if w.starts_with("--out=") => out = Some(w["--out=".len()..].to_string()),
            w if locator.is_none() && (w.starts_with("http://") || w.starts_with("https://")) => {
                locator = Some(w.to_string())
            }
            other => extra.push(other.to_string()),
        }
    }

    let locator = locator.ok_or_else(|| ValidationError::InvalidLocator {
        locator: command.to_string(),
        reason: "no http(s) locator in command".to_string(),
    })?;
    let dest_dir = match dir.map(PathBuf::from) {
        Some(d) if d.is_absolute() => d,
        Some(d) => config.models_root.join(d),
        None => config.default_destination.clone(),
    };
    Ok(TransferSpec::new(&locator, dest_dir, out.as_deref())?.with_extra_options(extra))
}

/// Read a script and turn each downloader command into a transfer spec.
pub fn specs_from_script(
    path: &Path,
    config: &PanelConfig,
) -> Result<Vec<TransferSpec>, ValidationError> {
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    extract_commands(&contents, &config.downloader.program)
        .iter()
        .map(|cmd| spec_from_command(cmd, config))
        .collect()
}
