//! Volume identifier codec.
//!
//! A volume is addressed by a single opaque `#`-separated string handed back
//! to the orchestration layer at provisioning time:
//!
//! `resource_group#account_name#share_name[#disk_name[#snapshot]]`
//!
//! Two separators describe a filesystem-mode volume, a third adds the VHD
//! disk name for block-mode volumes, a fourth appends a snapshot timestamp.
//! The codec is pure: no network or filesystem access.

use serde::{Deserialize, Serialize};

use crate::errors::{SharediskError, SharediskResult};

/// Field separator in encoded volume identifiers.
pub const SEPARATOR: char = '#';

/// Decoded coordinates of a volume.
///
/// Immutable once constructed; created at provisioning time and read-only
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeId {
    /// Resource group owning the storage account.
    pub resource_group: String,
    /// Storage account holding the share.
    pub account_name: String,
    /// Share name inside the account.
    pub share_name: String,
    /// VHD backing file name inside the share. Empty for filesystem-mode
    /// volumes.
    pub disk_name: String,
    /// Snapshot timestamp, present only on snapshot identifiers.
    pub snapshot: Option<String>,
}

impl VolumeId {
    /// Encode the coordinates into the opaque identifier string.
    ///
    /// The disk field is omitted entirely for filesystem-mode volumes unless
    /// a snapshot timestamp forces the full field count.
    pub fn encode(&self) -> String {
        let mut id = format!(
            "{}{sep}{}{sep}{}",
            self.resource_group,
            self.account_name,
            self.share_name,
            sep = SEPARATOR
        );
        if !self.disk_name.is_empty() || self.snapshot.is_some() {
            id.push(SEPARATOR);
            id.push_str(&self.disk_name);
        }
        if let Some(ts) = &self.snapshot {
            id.push(SEPARATOR);
            id.push_str(ts);
        }
        id
    }

    /// Decode an identifier into volume coordinates.
    ///
    /// Fails with [`SharediskError::Format`] when fewer than two separators
    /// are present. The disk name is empty-but-valid at two separators and
    /// populated at three. Anything past the fourth field is trailing
    /// metadata; the final field is kept as the snapshot timestamp.
    pub fn decode(id: &str) -> SharediskResult<Self> {
        let fields: Vec<&str> = id.split(SEPARATOR).collect();
        if fields.len() < 3 {
            return Err(SharediskError::Format(format!(
                "error parsing volume id {:?}, should at least contain two {}",
                id, SEPARATOR
            )));
        }
        let snapshot = if fields.len() >= 5 {
            fields.last().map(|s| (*s).to_string())
        } else {
            None
        };
        Ok(Self {
            resource_group: fields[0].to_string(),
            account_name: fields[1].to_string(),
            share_name: fields[2].to_string(),
            disk_name: fields.get(3).copied().unwrap_or_default().to_string(),
            snapshot,
        })
    }

    /// Extract the snapshot timestamp from a snapshot identifier.
    ///
    /// Fails with [`SharediskError::Format`] when fewer than four separators
    /// are present; on success returns only the final field.
    pub fn decode_snapshot(id: &str) -> SharediskResult<String> {
        let fields: Vec<&str> = id.split(SEPARATOR).collect();
        if fields.len() < 5 {
            return Err(SharediskError::Format(format!(
                "error parsing volume id {:?}, should at least contain four {}",
                id, SEPARATOR
            )));
        }
        // len >= 5 guarantees a last element
        Ok(fields.last().copied().unwrap_or_default().to_string())
    }

    /// True when this identifier points at a VHD block-mode volume.
    pub fn is_block_mode(&self) -> bool {
        !self.disk_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_field_counts() {
        let tests = vec![
            (
                "rg#f5713de20cde511e8ba4900#vol-dynamic-17e43f84#data.vhd",
                Some(("rg", "f5713de20cde511e8ba4900", "vol-dynamic-17e43f84", "data.vhd")),
            ),
            (
                "rg#f5713de20cde511e8ba4900#vol-dynamic-17e43f84",
                Some(("rg", "f5713de20cde511e8ba4900", "vol-dynamic-17e43f84", "")),
            ),
            ("rg#f5713de20cde511e8ba4900", None),
            ("rg", None),
            ("", None),
        ];

        for (id, expected) in tests {
            match expected {
                Some((rg, account, share, disk)) => {
                    let vol = VolumeId::decode(id).unwrap();
                    assert_eq!(vol.resource_group, rg);
                    assert_eq!(vol.account_name, account);
                    assert_eq!(vol.share_name, share);
                    assert_eq!(vol.disk_name, disk);
                }
                None => {
                    let err = VolumeId::decode(id).unwrap_err();
                    assert!(
                        matches!(err, SharediskError::Format(_)),
                        "decode({:?}) should fail with Format, got {:?}",
                        id,
                        err
                    );
                }
            }
        }
    }

    #[test]
    fn test_decode_snapshot() {
        let ts = VolumeId::decode_snapshot("rg#f123#csivolumename#diskname#2019-08-22T07:17:53.0000000Z")
            .unwrap();
        assert_eq!(ts, "2019-08-22T07:17:53.0000000Z");

        for id in ["rg#f123#csivolumename", "rg#f123", "rg", ""] {
            let err = VolumeId::decode_snapshot(id).unwrap_err();
            assert!(matches!(err, SharediskError::Format(_)));
        }
    }

    #[test]
    fn test_snapshot_kept_on_decode() {
        let vol = VolumeId::decode("rg#acct#share#disk.vhd#2019-08-22T07:17:53.0000000Z").unwrap();
        assert_eq!(vol.snapshot.as_deref(), Some("2019-08-22T07:17:53.0000000Z"));
        assert_eq!(
            vol.encode(),
            "rg#acct#share#disk.vhd#2019-08-22T07:17:53.0000000Z"
        );
    }

    #[test]
    fn test_block_mode() {
        assert!(VolumeId::decode("rg#acct#share#disk.vhd").unwrap().is_block_mode());
        assert!(!VolumeId::decode("rg#acct#share").unwrap().is_block_mode());
    }

    proptest! {
        /// decode(encode(v)) == v for all separator-free field values.
        #[test]
        fn roundtrip(
            rg in "[a-zA-Z0-9_-]{1,16}",
            account in "[a-z0-9]{3,24}",
            share in "[a-z0-9-]{3,63}",
            disk in prop::option::of("[a-z0-9.]{1,16}"),
            snapshot in prop::option::of("[0-9TZ:.-]{1,30}"),
        ) {
            let vol = VolumeId {
                resource_group: rg,
                account_name: account,
                share_name: share,
                disk_name: disk.unwrap_or_default(),
                snapshot,
            };
            let decoded = VolumeId::decode(&vol.encode()).unwrap();
            prop_assert_eq!(decoded, vol);
        }
    }
}
