//! Backup name rules and synthesized names.

use crate::config::QuickNamePolicy;
use crate::utils::errors::{KeeperError, Result};
use chrono::{DateTime, Local};

pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 36;

/// Characters reserved by common host filesystems for separators or wildcards.
pub const RESERVED_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const QUICK_PREFIX: &str = "Quick backup";

/// Check a user-supplied name. Runs before any I/O.
pub fn validate_name(name: &str) -> Result<()> {
    if let Some(ch) = name
        .chars()
        .find(|c| RESERVED_CHARS.contains(c) || c.is_control())
    {
        return Err(KeeperError::IllegalName {
            name: name.to_string(),
            ch,
        });
    }

    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) || name.trim().is_empty() {
        return Err(KeeperError::InvalidLength {
            len,
            min: MIN_NAME_LEN,
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// `Quick backup 2026-10-19 153000`: no reserved characters, fixed length.
pub fn quick_name(now: &DateTime<Local>) -> String {
    format!("{} {}", QUICK_PREFIX, now.format("%Y-%m-%d %H%M%S"))
}

pub fn default_description(now: &DateTime<Local>) -> String {
    format!("Created at {}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Resolve a collision on a synthesized name according to `policy`.
///
/// `taken` reports whether a candidate is already used.
pub fn resolve_quick_name<F>(base: String, policy: QuickNamePolicy, taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    if !taken(&base) {
        return Ok(base);
    }

    match policy {
        QuickNamePolicy::Reject => Err(KeeperError::DuplicateName(base)),
        QuickNamePolicy::Suffix => Ok(with_suffix(&base, taken)),
    }
}

/// `base` with the smallest free ` (n)` suffix, `n >= 2`.
///
/// The stem is shortened as needed so a valid `base` gives a valid name.
pub fn with_suffix<F>(base: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut n = 2u32;
    loop {
        let suffix = format!(" ({})", n);
        let keep = MAX_NAME_LEN.saturating_sub(suffix.chars().count());
        let stem: String = base.chars().take(keep).collect();
        let candidate = format!("{}{}", stem, suffix);

        debug_assert!(candidate.chars().count() <= MAX_NAME_LEN);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
