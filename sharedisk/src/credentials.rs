//! Credential resolution from orchestrator-supplied secrets.
//!
//! The secret mapping arrives with one of several legacy key spellings per
//! field. Lookup is case-insensitive and data-driven: candidate keys are
//! tried in order, so adding another legacy spelling is a one-line change.
//!
//! Precedence: the short form (`accountname`/`accountkey`) wins over the
//! prefixed form (`storageaccountname`/`storageaccountkey`) when both carry
//! a non-empty value.

use std::collections::HashMap;

use crate::errors::{SharediskError, SharediskResult};

/// Accepted key spellings for the account name, in precedence order.
const ACCOUNT_NAME_KEYS: &[&str] = &["accountname", "storageaccountname"];

/// Accepted key spellings for the account key, in precedence order.
const ACCOUNT_KEY_KEYS: &[&str] = &["accountkey", "storageaccountkey"];

/// Resolve the storage account name and key from a secret mapping.
///
/// Fails with [`SharediskError::NilInput`] when no mapping is supplied at
/// all, and with [`SharediskError::CredentialMissing`] when no recognized
/// key yields a non-empty value. Error messages list only the key names
/// present in the mapping, never the values.
pub fn resolve(
    secrets: Option<&HashMap<String, String>>,
) -> SharediskResult<(String, String)> {
    let secrets = secrets
        .ok_or_else(|| SharediskError::NilInput("credential secrets mapping is nil".into()))?;

    let lowered: HashMap<String, &str> = secrets
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect();

    let account_name = lookup(&lowered, ACCOUNT_NAME_KEYS)
        .ok_or_else(|| missing_error(ACCOUNT_NAME_KEYS, secrets))?;
    let account_key = lookup(&lowered, ACCOUNT_KEY_KEYS)
        .ok_or_else(|| missing_error(ACCOUNT_KEY_KEYS, secrets))?;

    Ok((account_name, account_key))
}

/// First candidate key with a non-empty value, if any.
fn lookup(secrets: &HashMap<String, &str>, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|key| secrets.get(*key).filter(|v| !v.is_empty()))
        .map(|v| (*v).to_string())
}

fn missing_error(candidates: &[&str], secrets: &HashMap<String, String>) -> SharediskError {
    let mut present: Vec<&str> = secrets.keys().map(String::as_str).collect();
    present.sort_unstable();
    SharediskError::CredentialMissing(format!(
        "could not find {} field in secrets (keys present: {:?})",
        candidates.join(" or "),
        present
    ))
}
