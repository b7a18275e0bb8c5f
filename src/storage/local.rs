// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Local filesystem storage.

Layout of one depot at `<data>/<repo>/<stage>/<arch_dir>/`:

```text
<arch_dir>/
  repodata/                       produced by the index builder
  <rpm files at root>             split-files off
  <X>/<rpm files starting X>      split-files on
```

Decompressed database caches live under
`<cache>/<repo>/<stage>-<arch>-<dbtype>.sqlite`.
*/

use {
    crate::{
        arch::Arch,
        cancel::CancelToken,
        createrepo::IndexBuilder,
        db::{self, DbType},
        error::{Result, RpmRepoError},
        io::unpack_sqlite,
        repodata::RepoMd,
        rpm_file,
        storage::{PermissionsPolicy, Stage, Storage, StorageOptions},
    },
    rusqlite::Connection,
    std::{
        cell::RefCell,
        collections::HashMap,
        io::ErrorKind,
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
        rc::Rc,
        sync::mpsc,
    },
    strum::IntoEnumIterator,
};

fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

fn io_path_err(path: &Path) -> impl FnOnce(std::io::Error) -> RpmRepoError + '_ {
    move |e| RpmRepoError::IoPath(path.display().to_string(), e)
}

/// One `(stage, architecture)` storage directory.
pub struct Depot {
    stage: Stage,
    arch: Arch,
    /// `<data>/<repo>/<stage>/<arch_dir>`.
    data_dir: PathBuf,
    /// `<cache>/<repo>`.
    cache_dir: PathBuf,
    split_files: bool,
    permissions: PermissionsPolicy,
    connections: RefCell<HashMap<DbType, Rc<Connection>>>,
}

impl Depot {
    fn new(
        stage: Stage,
        arch: Arch,
        data_dir: PathBuf,
        cache_dir: PathBuf,
        split_files: bool,
        permissions: PermissionsPolicy,
    ) -> Self {
        Self {
            stage,
            arch,
            data_dir,
            cache_dir,
            split_files,
            permissions,
            connections: RefCell::new(HashMap::new()),
        }
    }

    /// Whether this depot stores source packages.
    pub fn is_srpm(&self) -> bool {
        self.arch == Arch::Src
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn apply_permissions(&self, path: &Path, is_dir: bool) -> Result<()> {
        let mode = if is_dir {
            self.permissions.dir_mode
        } else {
            self.permissions.file_mode
        };

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(io_path_err(path))?;

        let uid = match &self.permissions.user {
            Some(name) => Some(
                nix::unistd::User::from_name(name)
                    .map_err(|e| RpmRepoError::Permissions(path.display().to_string(), e.to_string()))?
                    .ok_or_else(|| RpmRepoError::UnknownOwner(name.clone()))?
                    .uid,
            ),
            None => None,
        };

        let gid = match &self.permissions.group {
            Some(name) => Some(
                nix::unistd::Group::from_name(name)
                    .map_err(|e| RpmRepoError::Permissions(path.display().to_string(), e.to_string()))?
                    .ok_or_else(|| RpmRepoError::UnknownOwner(name.clone()))?
                    .gid,
            ),
            None => None,
        };

        if uid.is_some() || gid.is_some() {
            nix::unistd::chown(path, uid, gid).map_err(|e| {
                RpmRepoError::Permissions(path.display().to_string(), e.to_string())
            })?;
        }

        Ok(())
    }

    /// Storage-relative path a file with this base name is stored under.
    fn target_rel_path(&self, basename: &str) -> Result<String> {
        if !self.split_files {
            return Ok(basename.to_string());
        }

        let first = basename
            .chars()
            .next()
            .filter(|c| c.is_ascii_alphanumeric())
            .ok_or_else(|| RpmRepoError::BadSplitLetter(basename.to_string()))?;

        Ok(format!("{}/{}", first, basename))
    }

    fn copy_into(&self, src: &Path, rel_path: &str) -> Result<()> {
        let dst = self.data_dir.join(rel_path);

        let dir = dst
            .parent()
            .ok_or_else(|| {
                RpmRepoError::IoPath(
                    dst.display().to_string(),
                    std::io::Error::new(ErrorKind::NotFound, "no parent directory"),
                )
            })?
            .to_path_buf();

        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(io_path_err(&dir))?;
            self.apply_permissions(&dir, true)?;
        }

        let mut reader = std::fs::File::open(src).map_err(io_path_err(src))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_path_err(&dir))?;
        std::io::copy(&mut reader, &mut temp).map_err(io_path_err(&dst))?;

        self.apply_permissions(temp.path(), false)?;

        temp.persist(&dst)
            .map_err(|e| RpmRepoError::IoPath(dst.display().to_string(), e.error))?;

        Ok(())
    }

    fn add_package(&self, src: &Path, replace: bool) -> Result<String> {
        if !rpm_file::is_rpm(src)? {
            return Err(RpmRepoError::NotRpm(src.display().to_string()));
        }

        let basename = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RpmRepoError::NotRpm(src.display().to_string()))?;

        let rel_path = self.target_rel_path(basename)?;

        if self.data_dir.join(&rel_path).exists() && !replace {
            return Err(RpmRepoError::PackageAlreadyPresent(
                basename.to_string(),
                self.stage.name(),
            ));
        }

        self.copy_into(src, &rel_path)?;

        log::info!(
            "added {} to {}/{}",
            basename,
            self.stage,
            self.arch
        );

        Ok(rel_path)
    }

    fn remove_package(&self, rel_path: &str) -> Result<()> {
        let path = self.data_dir.join(rel_path);

        if !path.exists() {
            return Err(RpmRepoError::PackageFileNotFound(
                rel_path.to_string(),
                self.stage.name(),
            ));
        }

        std::fs::remove_file(&path).map_err(io_path_err(&path))?;

        // Drop a now-empty single-letter subdirectory.
        if self.split_files {
            if let Some(parent) = path.parent() {
                if parent != self.data_dir
                    && parent
                        .read_dir()
                        .map(|mut entries| entries.next().is_none())
                        .unwrap_or(false)
                {
                    std::fs::remove_dir(parent).map_err(io_path_err(parent))?;
                }
            }
        }

        log::info!(
            "removed {} from {}/{}",
            rel_path,
            self.stage,
            self.arch
        );

        Ok(())
    }

    fn copy_from(&self, source: &Depot, rel_path: &str) -> Result<()> {
        let src = source.data_dir.join(rel_path);

        if !src.exists() {
            return Err(RpmRepoError::PackageFileNotFound(
                rel_path.to_string(),
                source.stage.name(),
            ));
        }

        self.copy_into(&src, rel_path)?;

        log::info!(
            "copied {} from {}/{} to {}/{}",
            rel_path,
            source.stage,
            source.arch,
            self.stage,
            self.arch
        );

        Ok(())
    }

    fn has_package(&self, basename: &str) -> Result<bool> {
        Ok(self.data_dir.join(self.target_rel_path(basename)?).exists())
    }

    fn is_empty(&self) -> Result<bool> {
        let entries = match self.data_dir.read_dir() {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(RpmRepoError::IoPath(self.data_dir.display().to_string(), e)),
        };

        for entry in entries {
            let entry = entry.map_err(io_path_err(&self.data_dir))?;
            let path = entry.path();
            let name = entry.file_name();

            if path.is_dir() {
                if name == "repodata" {
                    continue;
                }

                for inner in path.read_dir().map_err(io_path_err(&path))? {
                    let inner = inner.map_err(io_path_err(&path))?;
                    if inner.path().extension().map(|e| e == "rpm").unwrap_or(false) {
                        return Ok(false);
                    }
                }
            } else if path.extension().map(|e| e == "rpm").unwrap_or(false) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn repomd_path(&self) -> PathBuf {
        self.data_dir.join("repodata").join("repomd.xml")
    }

    fn repomd(&self) -> Result<RepoMd> {
        RepoMd::from_path(self.repomd_path())
    }

    /// `<cache>/<repo>/<stage>-<arch>-<dbtype>.sqlite`.
    fn cache_file(&self, db_type: DbType) -> PathBuf {
        self.cache_dir.join(format!(
            "{}-{}-{}.sqlite",
            self.stage,
            self.arch,
            db_type.short_name()
        ))
    }

    fn is_cache_valid(&self) -> bool {
        let repomd = match self.repomd() {
            Ok(repomd) => repomd,
            Err(_) => return false,
        };

        let now = now_seconds();

        DbType::all().iter().all(|db_type| {
            repomd
                .get(db_type.section())
                .and_then(|record| record.timestamp)
                .map(|ts| db::is_cache_file_valid(self.cache_file(*db_type), ts, now))
                .unwrap_or(false)
        })
    }

    fn warmup_cache(&self) -> Result<()> {
        let repomd = self.repomd()?;
        let now = now_seconds();

        for db_type in DbType::all() {
            let record = repomd
                .get(db_type.section())
                .ok_or(RpmRepoError::MetadataFileNotFound(db_type.section()))?;
            let ts = record.required_timestamp(db_type.section())?;

            let cache_file = self.cache_file(db_type);

            if !db::is_cache_file_valid(&cache_file, ts, now) {
                if ts > now {
                    log::warn!(
                        "{} timestamp for {}/{} is in the future; rebuilding cache",
                        db_type.section(),
                        self.stage,
                        self.arch
                    );
                }

                let compressed = self.data_dir.join(&record.location.href);
                unpack_sqlite(&compressed, &cache_file)?;
                filetime::set_file_mtime(&cache_file, filetime::FileTime::from_unix_time(ts, 0))
                    .map_err(io_path_err(&cache_file))?;
            }
        }

        let mut connections = self.connections.borrow_mut();
        for db_type in DbType::all() {
            if !connections.contains_key(&db_type) {
                let conn = db::open_read_only(self.cache_file(db_type))?;
                connections.insert(db_type, Rc::new(conn));
            }
        }

        Ok(())
    }

    fn invalidate_cache(&self) {
        self.connections.borrow_mut().clear();
    }

    fn purge_cache(&self) -> Result<()> {
        self.invalidate_cache();

        for db_type in DbType::all() {
            let path = self.cache_file(db_type);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(RpmRepoError::IoPath(path.display().to_string(), e)),
            }
        }

        Ok(())
    }

    fn db(&self, db_type: DbType) -> Result<Rc<Connection>> {
        if let Some(conn) = self.connections.borrow().get(&db_type) {
            return Ok(Rc::clone(conn));
        }

        if !self.is_cache_valid() {
            self.warmup_cache()?;
        }

        let mut connections = self.connections.borrow_mut();
        if !connections.contains_key(&db_type) {
            let conn = db::open_read_only(self.cache_file(db_type))?;
            connections.insert(db_type, Rc::new(conn));
        }

        Ok(Rc::clone(&connections[&db_type]))
    }
}

/// Filesystem-backed [Storage].
pub struct LocalStorage {
    /// `<data>/<repo>`.
    data_root: PathBuf,
    depots: HashMap<(Stage, Arch), Depot>,
    builder: IndexBuilder,
    permissions: PermissionsPolicy,
}

impl LocalStorage {
    /// Construct a storage for a repository covering the given
    /// architectures. `noarch` is a pseudo-architecture and is rejected.
    pub fn new(repo: &str, arches: &[Arch], options: StorageOptions) -> Result<Self> {
        if arches.iter().any(|a| *a == Arch::Noarch) {
            return Err(RpmRepoError::NoarchPseudoArch);
        }

        let data_root = options.data_dir.join(repo);
        let cache_root = options.cache_dir.join(repo);

        let mut depots = HashMap::new();

        for stage in Stage::all() {
            for arch in arches {
                let dir = arch
                    .dir()
                    .ok_or_else(|| RpmRepoError::UnknownArchitecture(arch.name().to_string()))?;

                depots.insert(
                    (stage, *arch),
                    Depot::new(
                        stage,
                        *arch,
                        data_root.join(stage.name()).join(dir),
                        cache_root.clone(),
                        options.split_files,
                        options.permissions.clone(),
                    ),
                );
            }
        }

        Ok(Self {
            data_root,
            depots,
            builder: IndexBuilder::new(options.index.clone()),
            permissions: options.permissions.clone(),
        })
    }

    /// Override the index builder program. Used by tests.
    pub fn with_index_program(mut self, program: impl ToString) -> Self {
        self.builder = self.builder.with_program(program.to_string());
        self
    }

    /// Resolve the depot for an operation. `noarch` dispatches to the
    /// first binary architecture of the stage.
    fn resolve(&self, stage: Stage, arch: Arch) -> Result<&Depot> {
        let arch = if arch == Arch::Noarch {
            Arch::iter()
                .filter(|a| a.is_binary())
                .find(|a| self.depots.contains_key(&(stage, *a)))
                .ok_or(RpmRepoError::NoarchWithoutBinaryArch)?
        } else {
            arch
        };

        self.depots
            .get(&(stage, arch))
            .ok_or_else(|| RpmRepoError::NoDepot(arch.name(), stage.name()))
    }

    fn apply_dir_permissions(&self, path: &Path) -> Result<()> {
        std::fs::set_permissions(
            path,
            std::fs::Permissions::from_mode(self.permissions.dir_mode),
        )
        .map_err(io_path_err(path))
    }
}

impl Storage for LocalStorage {
    fn initialize(&self, arches: &[Arch]) -> Result<()> {
        if self.is_initialized() {
            return Err(RpmRepoError::StorageAlreadyInitialized);
        }

        for arch in arches {
            if *arch == Arch::Noarch {
                return Err(RpmRepoError::NoarchPseudoArch);
            }
        }

        for stage in Stage::all() {
            for arch in arches {
                let depot = self.resolve(stage, *arch)?;

                std::fs::create_dir_all(depot.data_dir()).map_err(io_path_err(depot.data_dir()))?;
            }

            self.apply_dir_permissions(&self.data_root.join(stage.name()))?;

            for arch in arches {
                self.apply_dir_permissions(self.resolve(stage, *arch)?.data_dir())?;
            }
        }

        self.apply_dir_permissions(&self.data_root)?;

        log::info!("initialized storage at {}", self.data_root.display());

        Ok(())
    }

    fn is_initialized(&self) -> bool {
        Stage::all()
            .iter()
            .any(|stage| self.data_root.join(stage.name()).is_dir())
    }

    fn is_empty(&self, stage: Stage, arch: Arch) -> Result<bool> {
        self.resolve(stage, arch)?.is_empty()
    }

    fn has_arch(&self, stage: Stage, arch: Arch) -> bool {
        if arch == Arch::Noarch {
            return self
                .depots
                .keys()
                .any(|(s, a)| *s == stage && a.is_binary());
        }

        self.depots.contains_key(&(stage, arch))
    }

    fn arches(&self, stage: Stage) -> Vec<Arch> {
        Arch::iter()
            .filter(|arch| self.depots.contains_key(&(stage, *arch)))
            .collect()
    }

    fn add_package(&self, stage: Stage, arch: Arch, src: &Path, replace: bool) -> Result<String> {
        self.resolve(stage, arch)?.add_package(src, replace)
    }

    fn remove_package(&self, stage: Stage, arch: Arch, rel_path: &str) -> Result<()> {
        self.resolve(stage, arch)?.remove_package(rel_path)
    }

    fn copy_package(
        &self,
        from: Stage,
        to: Stage,
        arch: Arch,
        rel_path: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let source = self.resolve(from, arch)?;
        let target = self.resolve(to, arch)?;

        cancel.check()?;
        let _guard = cancel.protect();

        target.copy_from(source, rel_path)
    }

    fn has_package(&self, stage: Stage, arch: Arch, basename: &str) -> Result<bool> {
        self.resolve(stage, arch)?.has_package(basename)
    }

    fn package_path(&self, stage: Stage, arch: Arch, rel_path: &str) -> Result<PathBuf> {
        Ok(self.resolve(stage, arch)?.data_dir().join(rel_path))
    }

    fn data_path(&self, stage: Stage, arch: Arch) -> Result<PathBuf> {
        Ok(self.resolve(stage, arch)?.data_dir().to_path_buf())
    }

    fn reindex(
        &self,
        stage: Stage,
        arch: Arch,
        full: bool,
        progress: Option<&mpsc::Sender<String>>,
    ) -> Result<()> {
        let depot = self.resolve(stage, arch)?;

        self.builder.run(depot.data_dir(), full, progress)?;
        depot.invalidate_cache();

        Ok(())
    }

    fn db(&self, stage: Stage, arch: Arch, db_type: DbType) -> Result<Rc<Connection>> {
        self.resolve(stage, arch)?.db(db_type)
    }

    fn mod_time(&self, stage: Stage, arch: Arch) -> Result<i64> {
        db::mtime_seconds(self.resolve(stage, arch)?.repomd_path())
    }

    fn warmup_cache(&self, stage: Stage, arch: Arch) -> Result<()> {
        self.resolve(stage, arch)?.warmup_cache()
    }

    fn invalidate_cache(&self, stage: Stage, arch: Arch) {
        if let Ok(depot) = self.resolve(stage, arch) {
            depot.invalidate_cache();
        }
    }

    fn is_cache_valid(&self, stage: Stage, arch: Arch) -> bool {
        self.resolve(stage, arch)
            .map(|depot| depot.is_cache_valid())
            .unwrap_or(false)
    }

    fn purge_cache(&self) -> Result<()> {
        for depot in self.depots.values() {
            depot.purge_cache()?;
        }

        Ok(())
    }
}
