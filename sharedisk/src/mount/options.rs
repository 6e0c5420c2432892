//! Mount option builder.

use crate::config::MountDefaults;
use crate::constants::mount::{DIR_MODE, FILE_MODE, VERS};

/// Fill in required defaults for a network-share mount option set.
///
/// Scans the caller's options for directory-mode, file-mode and
/// protocol-version directives and appends `name=default` for each one that
/// is missing, in that fixed order, after all original entries. Input order
/// is preserved and the builder is idempotent: running it on its own output
/// adds nothing.
pub fn append_default_mount_options(options: &[String], defaults: &MountDefaults) -> Vec<String> {
    let mut has_dir_mode = false;
    let mut has_file_mode = false;
    let mut has_vers = false;
    for option in options {
        if option.starts_with(DIR_MODE) {
            has_dir_mode = true;
        } else if option.starts_with(FILE_MODE) {
            has_file_mode = true;
        } else if option.starts_with(VERS) {
            has_vers = true;
        }
    }

    let mut result = options.to_vec();
    if !has_dir_mode {
        result.push(format!("{}={}", DIR_MODE, defaults.dir_mode));
    }
    if !has_file_mode {
        result.push(format!("{}={}", FILE_MODE, defaults.file_mode));
    }
    if !has_vers {
        result.push(format!("{}={}", VERS, defaults.vers));
    }
    result
}
