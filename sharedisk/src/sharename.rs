//! Share name derivation.
//!
//! The provider only accepts lowercase letters, digits and single hyphens,
//! no leading or trailing hyphen, 3 to 63 characters. User-supplied volume
//! names are sanitized into that alphabet; inputs too short to be
//! distinguishable are replaced with a generated unique name.

use uuid::Uuid;

use crate::constants::share::{GENERATED_NAME_PREFIX, NAME_MAX_LEN, NAME_MIN_LEN};

/// Derive a provider-legal share name from a volume name.
///
/// Lowercases, drops characters outside `[a-z0-9-]`, collapses hyphen runs
/// and truncates to 63 characters. When the sanitized candidate falls below
/// the minimum viable length the result is a fresh generated name instead,
/// so the output is never a fixed constant across calls.
pub fn derive_share_name(volume_name: &str) -> String {
    let mut name = String::with_capacity(volume_name.len().min(NAME_MAX_LEN));
    let mut prev_hyphen = false;
    for c in volume_name.to_lowercase().chars() {
        if name.len() == NAME_MAX_LEN {
            break;
        }
        match c {
            'a'..='z' | '0'..='9' => {
                name.push(c);
                prev_hyphen = false;
            }
            '-' => {
                if !prev_hyphen {
                    name.push('-');
                    prev_hyphen = true;
                }
            }
            _ => {}
        }
    }
    if name.len() < NAME_MIN_LEN {
        return generated_share_name();
    }
    name
}

/// Fresh unique share name with the recognizable generated prefix.
pub fn generated_share_name() -> String {
    format!("{}-{}", GENERATED_NAME_PREFIX, Uuid::new_v4().simple())
}

/// True only when the first and last characters are each alphanumeric.
///
/// Guard used before submitting a name to the provider, which rejects
/// leading or trailing hyphens and punctuation.
pub fn begins_and_ends_valid(name: &str) -> bool {
    let first = name.chars().next();
    let last = name.chars().next_back();
    match (first, last) {
        (Some(f), Some(l)) => f.is_ascii_alphanumeric() && l.is_ascii_alphanumeric(),
        _ => false,
    }
}
