// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Storage of repository contents.

A repository stores its packages in per-`(stage, architecture)` depot
directories. [Storage] is the capability seam: the engine only talks to
this trait, and [local::LocalStorage] is the filesystem implementation.
Other backends (object storage, a read-only mirror) fit the same
contract.
*/

pub mod local;

use {
    crate::{
        arch::Arch, cancel::CancelToken, createrepo::IndexOptions, db::DbType, error::Result,
    },
    rusqlite::Connection,
    serde::{Deserialize, Serialize},
    std::{
        fmt::{Display, Formatter},
        path::{Path, PathBuf},
        rc::Rc,
        sync::mpsc,
    },
};

/// One of the two sub-repositories of a repository.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The unstable staging area.
    Testing,
    /// The stable released area.
    Release,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Release => "release",
        }
    }

    pub fn all() -> [Stage; 2] {
        [Self::Testing, Self::Release]
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ownership and mode policy applied to stored files and directories.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionsPolicy {
    /// Owning user name. `None` keeps the invoking user.
    pub user: Option<String>,
    /// Owning group name. `None` keeps the invoking group.
    pub group: Option<String>,
    /// Mode bits for package files.
    #[serde(rename = "file")]
    pub file_mode: u32,
    /// Mode bits for directories.
    #[serde(rename = "dir")]
    pub dir_mode: u32,
}

impl Default for PermissionsPolicy {
    fn default() -> Self {
        Self {
            user: None,
            group: None,
            file_mode: 0o644,
            dir_mode: 0o755,
        }
    }
}

/// Configuration of a storage instance.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StorageOptions {
    /// Root under which repository data directories live.
    pub data_dir: PathBuf,
    /// Root under which decompressed database caches live.
    pub cache_dir: PathBuf,
    /// Store each package under a single-letter subdirectory derived
    /// from the first character of its file name.
    #[serde(default)]
    pub split_files: bool,
    #[serde(default)]
    pub permissions: PermissionsPolicy,
    #[serde(default)]
    pub index: IndexOptions,
}

/// Capability set every storage backend provides.
pub trait Storage {
    /// Create the directory tree for both stages of the given
    /// architectures. Fails when the storage already holds data.
    fn initialize(&self, arches: &[Arch]) -> Result<()>;

    /// Whether the storage has been initialized.
    fn is_initialized(&self) -> bool;

    /// Whether the depot holds no packages.
    fn is_empty(&self, stage: Stage, arch: Arch) -> Result<bool>;

    /// Whether a depot exists for the architecture.
    fn has_arch(&self, stage: Stage, arch: Arch) -> bool;

    /// The architectures with a depot in the stage, in canonical order.
    fn arches(&self, stage: Stage) -> Vec<Arch>;

    /// Copy a package file into the depot. Returns the storage-relative
    /// path of the stored file.
    fn add_package(&self, stage: Stage, arch: Arch, src: &Path, replace: bool) -> Result<String>;

    /// Delete a stored package file.
    fn remove_package(&self, stage: Stage, arch: Arch, rel_path: &str) -> Result<()>;

    /// Copy a stored package between the depots of two stages,
    /// bit-identically.
    ///
    /// Copying one package is a cancel-protected critical section.
    fn copy_package(
        &self,
        from: Stage,
        to: Stage,
        arch: Arch,
        rel_path: &str,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Whether a package file with the given base name is stored.
    fn has_package(&self, stage: Stage, arch: Arch, basename: &str) -> Result<bool>;

    /// Absolute path of a stored package file.
    fn package_path(&self, stage: Stage, arch: Arch, rel_path: &str) -> Result<PathBuf>;

    /// Absolute path of the depot data directory.
    fn data_path(&self, stage: Stage, arch: Arch) -> Result<PathBuf>;

    /// Rebuild the depot's repodata with the external index builder.
    fn reindex(
        &self,
        stage: Stage,
        arch: Arch,
        full: bool,
        progress: Option<&mpsc::Sender<String>>,
    ) -> Result<()>;

    /// Open (or return the retained) read-only connection to one of the
    /// depot's databases, materializing the cache when stale.
    fn db(&self, stage: Stage, arch: Arch, db_type: DbType) -> Result<Rc<Connection>>;

    /// Modification time of the depot's `repomd.xml`, seconds since the
    /// epoch.
    fn mod_time(&self, stage: Stage, arch: Arch) -> Result<i64>;

    /// Materialize the decompressed database cache and open connections.
    fn warmup_cache(&self, stage: Stage, arch: Arch) -> Result<()>;

    /// Drop retained connections and mark the cache cold.
    fn invalidate_cache(&self, stage: Stage, arch: Arch);

    /// Whether every cached database file is fresh, without mutating.
    fn is_cache_valid(&self, stage: Stage, arch: Arch) -> bool;

    /// Delete all cached database files and mark every depot cold.
    fn purge_cache(&self) -> Result<()>;
}
