//! Parsing chat messages into bot commands, and path helpers for them.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::GtbotError;

static UPLOAD: LazyLock<Regex> = LazyLock::new(|| path_command("upload"));
static SAVE: LazyLock<Regex> = LazyLock::new(|| path_command("save"));

static CREATE_CUTOUTS: LazyLock<Regex> = LazyLock::new(|| link_command(r"cutouts?"));
static CREATE_BBOXES: LazyLock<Regex> = LazyLock::new(|| link_command(r"bbox(?:es)?"));

static BUCKET_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[/\w\s]*seungmount/([/\w\s.\-]+)").expect("bucket path pattern is valid")
});

static WINDOWS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]:|\\\\[^\\]+\\[^\\]+)\\(.+)$").expect("windows path pattern is valid")
});

fn path_command(verb: &str) -> Regex {
    let pattern = format!(r#"^{}[\s,:]*['"`<~]*([!#$&-;=?-\[\]_~:/\\\w\s]+)[>'"`]*"#, verb);
    Regex::new(&pattern).expect("path command pattern is valid")
}

fn link_command(noun: &str) -> Regex {
    let pattern = format!(
        r#"^create\s*{}[\s,:]*['"`<]*((?:[!#$&-;=?-\[\]{{}}"_a-z~]|%[0-9a-fA-F]{{2}})+)[>'"`]*"#,
        noun
    );
    Regex::new(&pattern).expect("link command pattern is valid")
}

/// Where an upload lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    /// Short-lived previews (`upload`).
    Scratch,
    /// Kept results (`save`).
    Permanent,
}

/// A request understood by the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Upload an edited cutout found at `path`.
    Upload { path: String, bucket: Bucket },
    /// Cut out every box annotation of a viewer link.
    CreateCutouts { link: String },
    /// Expand point annotations of a viewer link into boxes.
    CreateBboxes { link: String },
}

impl Command {
    /// Parses a chat message addressed to the bot.
    ///
    /// A leading `bot_id` mention and any punctuation after it are removed
    /// first. Commands are matched at the start of the remaining text.
    pub fn parse(message: &str, bot_id: Option<&str>) -> Result<Self, GtbotError> {
        let text = strip_mention(message, bot_id);

        if let Some(path) = capture(&UPLOAD, &text) {
            return Ok(Command::Upload {
                path,
                bucket: Bucket::Scratch,
            });
        }
        if let Some(path) = capture(&SAVE, &text) {
            return Ok(Command::Upload {
                path,
                bucket: Bucket::Permanent,
            });
        }
        if let Some(link) = capture(&CREATE_CUTOUTS, &text) {
            return Ok(Command::CreateCutouts { link });
        }
        if let Some(link) = capture(&CREATE_BBOXES, &text) {
            return Ok(Command::CreateBboxes { link });
        }
        Err(GtbotError::UnknownCommand(text))
    }
}

fn strip_mention(message: &str, bot_id: Option<&str>) -> String {
    let text = match bot_id {
        Some(id) if !id.is_empty() => message.replace(id, ""),
        _ => message.to_string(),
    };
    text.trim()
        .trim_start_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_string()
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The part of a mounted path below `seungmount/`, or the drive-relative
/// part of a Windows path, with forward slashes.
pub fn bucket_path(path: &str) -> Option<String> {
    if let Some(m) = BUCKET_PATH.captures(path).and_then(|c| c.get(1)) {
        let found = m.as_str().trim();
        return (!found.is_empty()).then(|| found.to_string());
    }
    WINDOWS_PATH
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('\\', "/"))
}

/// `bucket://<path>` for a path inside the shared mount, else `path`.
pub fn bucket_url(path: &Path) -> String {
    let text = path.display().to_string();
    match bucket_path(&text) {
        Some(p) => format!("bucket://{}", p),
        None => text,
    }
}

/// Resolves a path pasted in chat against the local mount of the shared
/// bucket. Returns `None` unless the resolved path exists.
pub fn guess_path(path: &str, workspace_prefix: &Path) -> Option<PathBuf> {
    let candidate = workspace_prefix.join(bucket_path(path)?);
    candidate.exists().then_some(candidate)
}

/// Replaces characters outside `[A-Za-z0-9 ._-]` (Unicode letters and
/// digits allowed) with `_` and trims trailing whitespace.
pub fn safe_string(s: &str) -> String {
    sanitize(s, &[' ', '.', '_', '-'])
}

/// Directory-safe form of an annotation description, at most 16 chars.
pub fn safe_description(s: &str) -> String {
    sanitize(s, &[' ', '.', '_']).chars().take(16).collect()
}

fn sanitize(s: &str, keep: &[char]) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || keep.contains(&c) {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}
