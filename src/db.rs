// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repodata SQLite databases.

Each depot carries three logical databases produced by the index builder:
`primary` (identity, dependencies, build info), `filelists` (shipped
files) and `other` (changelogs). The engine only ever reads them; a
decompressed copy of each is materialized into the local cache before
opening.
*/

use {
    crate::error::{Result, RpmRepoError},
    rusqlite::{Connection, OpenFlags},
    std::path::Path,
    strum::EnumIter,
};

/// One of the three logical repodata databases.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, EnumIter)]
pub enum DbType {
    Primary,
    Filelists,
    Other,
}

impl DbType {
    /// The `repomd.xml` data section describing the SQLite variant.
    pub fn section(&self) -> &'static str {
        match self {
            Self::Primary => "primary_db",
            Self::Filelists => "filelists_db",
            Self::Other => "other_db",
        }
    }

    /// Short name used in cache file names.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Filelists => "filelists",
            Self::Other => "other",
        }
    }

    /// All database types, in a fixed order.
    pub fn all() -> [DbType; 3] {
        [Self::Primary, Self::Filelists, Self::Other]
    }
}

/// Open a read-only connection to a SQLite database file.
pub fn open_read_only(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Modification time of a file in whole seconds since the epoch.
pub fn mtime_seconds(path: impl AsRef<Path>) -> Result<i64> {
    let path = path.as_ref();

    let metadata = std::fs::metadata(path)
        .map_err(|e| RpmRepoError::IoPath(path.display().to_string(), e))?;

    Ok(filetime::FileTime::from_last_modification_time(&metadata).unix_seconds())
}

/// Whether a cached database file is fresh relative to the timestamp
/// recorded in `repomd.xml`.
///
/// A timestamp in the future marks the cache invalid: tampered or
/// clock-skewed metadata must not be trusted.
pub fn is_cache_file_valid(path: impl AsRef<Path>, recorded: i64, now: i64) -> bool {
    if recorded > now {
        return false;
    }

    match mtime_seconds(path) {
        Ok(mtime) => mtime == recorded,
        Err(_) => false,
    }
}
