use std::fmt;

use serde::Serialize;

/// Identity of a physical export file, derived purely from its file name.
///
/// Export names follow `<year><Topic>[_partN].<ext>`. Uploads through some
/// object stores rename shards to `<year><Topic>.txt_partN` or
/// `<year><Topic>_txt_partN.txt`; all of these resolve to the same logical
/// table with a shard index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceName {
    pub logical: String,
    pub shard: Option<u32>,
}

impl SourceName {
    pub fn is_shard(&self) -> bool {
        self.shard.is_some()
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shard {
            Some(index) => write!(f, "{} (part {})", self.logical, index),
            None => f.write_str(&self.logical),
        }
    }
}

/// Parses a file name into a [`SourceName`].
///
/// Returns `None` when the name carries none of the accepted `extensions`
/// (compared case-insensitively, without the leading dot) or when nothing is
/// left once the extension and shard marker are removed.
pub fn parse_source_name(file_name: &str, extensions: &[String]) -> Option<SourceName> {
    let (mut stem, mut has_extension) = strip_extension(file_name, extensions, '.');

    let mut shard = None;
    if let Some((base, index)) = split_shard_marker(stem) {
        shard = Some(index);
        stem = base;
        if !has_extension {
            let (base, stripped) = strip_extension(stem, extensions, '.');
            let (base, stripped) = if stripped {
                (base, stripped)
            } else {
                strip_extension(base, extensions, '_')
            };
            stem = base;
            has_extension = stripped;
        } else {
            // `<name>_txt_partN.txt`
            let (base, _) = strip_extension(stem, extensions, '_');
            let (base, _) = strip_extension(base, extensions, '.');
            stem = base;
        }
    }

    if !has_extension || stem.is_empty() {
        return None;
    }

    Some(SourceName {
        logical: stem.to_string(),
        shard,
    })
}

fn strip_extension<'a>(name: &'a str, extensions: &[String], dot: char) -> (&'a str, bool) {
    for ext in extensions {
        let ext = ext.trim_start_matches('.');
        if ext.is_empty() || name.len() <= ext.len() + 1 {
            continue;
        }
        let split = name.len() - ext.len() - 1;
        if !name.is_char_boundary(split) {
            continue;
        }
        let (base, suffix) = name.split_at(split);
        let mut chars = suffix.chars();
        if chars.next() == Some(dot) && chars.as_str().eq_ignore_ascii_case(ext) {
            return (base, true);
        }
    }
    (name, false)
}

fn split_shard_marker(name: &str) -> Option<(&str, u32)> {
    let lower = name.to_ascii_lowercase();
    let marker = lower.rfind("part")?;
    let digits = &name[marker + 4..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let separator = name[..marker].chars().last()?;
    if separator != '_' && separator != '.' {
        return None;
    }
    let index = digits.parse().ok()?;
    Some((&name[..marker - 1], index))
}
