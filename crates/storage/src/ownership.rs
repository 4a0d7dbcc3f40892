//! Ownership and permission policy applied to materialized sites.

use crate::error::{StorageError, StorageResult};
use nix::unistd::{Gid, Group, Uid, User, chown};
use plinth_core::config::SitesConfig;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Who owns site files and which mode bits they get.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipPolicy {
    pub uid: Option<Uid>,
    pub gid: Option<Gid>,
    pub dir_mode: u32,
    pub file_mode: u32,
}

impl OwnershipPolicy {
    /// Apply modes only; leave ownership with the process user.
    pub fn modes_only(dir_mode: u32, file_mode: u32) -> Self {
        Self {
            uid: None,
            gid: None,
            dir_mode,
            file_mode,
        }
    }

    /// Resolve the configured user and group names.
    ///
    /// An unknown user is a configuration error. An unknown group only logs a
    /// warning, so a host without a web-server group can still run.
    pub fn from_config(config: &SitesConfig) -> StorageResult<Self> {
        let uid = match &config.owner_user {
            Some(name) => {
                let user = User::from_name(name)
                    .map_err(|e| StorageError::Config(format!("looking up user {name}: {e}")))?
                    .ok_or_else(|| StorageError::Config(format!("unknown user: {name}")))?;
                Some(user.uid)
            }
            None => None,
        };

        let gid = match &config.owner_group {
            Some(name) => match Group::from_name(name) {
                Ok(Some(group)) => Some(group.gid),
                Ok(None) => {
                    warn!(group = %name, "site group not found, group ownership left unchanged");
                    None
                }
                Err(e) => {
                    warn!(group = %name, error = %e, "site group lookup failed");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            uid,
            gid,
            dir_mode: config.dir_mode,
            file_mode: config.file_mode,
        })
    }

    /// Apply ownership and modes to `root` and everything beneath it.
    ///
    /// A failed `chown` (typically an unprivileged process) disables further
    /// ownership changes for this call and logs once; modes are still applied.
    pub fn apply(&self, root: &Path) -> StorageResult<()> {
        let mut chown_enabled = self.uid.is_some() || self.gid.is_some();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
            let file_type = entry.file_type();
            let path = entry.path();

            if file_type.is_symlink() {
                // Never produced by extraction; refuse to chmod through it.
                return Err(StorageError::InvalidPath(format!(
                    "unexpected symlink in site: {}",
                    path.display()
                )));
            }

            if chown_enabled && let Err(e) = chown(path, self.uid, self.gid) {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "chown failed, applying permission bits only"
                );
                chown_enabled = false;
            }

            let mode = if file_type.is_dir() {
                self.dir_mode
            } else {
                self.file_mode
            };
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }

        Ok(())
    }
}
