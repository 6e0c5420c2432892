//! Driver-wide constants.
//!
//! Centralized location for mount defaults and share naming values.

/// Network share mount option configuration
pub mod mount {
    /// Option name for directory permission mode
    pub const DIR_MODE: &str = "dir_mode";

    /// Option name for file permission mode
    pub const FILE_MODE: &str = "file_mode";

    /// Option name for the share protocol version
    pub const VERS: &str = "vers";

    /// Default directory permission mode
    pub const DEFAULT_DIR_MODE: &str = "0777";

    /// Default file permission mode
    pub const DEFAULT_FILE_MODE: &str = "0777";

    /// Default share protocol version
    pub const DEFAULT_VERS: &str = "3.0";

    /// Filesystem type used to mount network shares
    pub const SHARE_FS_TYPE: &str = "cifs";
}

/// Share naming configuration
pub mod share {
    /// Prefix for generated share names (too-short or invalid user input)
    pub const GENERATED_NAME_PREFIX: &str = "share-dynamic";

    /// Provider maximum share name length
    pub const NAME_MAX_LEN: usize = 63;

    /// Shortest share name we accept without generating a fresh one
    pub const NAME_MIN_LEN: usize = 3;
}

/// VHD block volume configuration
pub mod vhd {
    /// File extension for VHD backing files inside a share
    pub const FILE_EXTENSION: &str = "vhd";

    /// Default filesystem type for freshly formatted loop devices
    pub const DEFAULT_FS_TYPE: &str = "ext4";
}
