// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The repository façade.

A [Repository] owns a storage, an optional signing key and the policies
that gate mutations: the file name filter, the replace bit and the
signing requirement. Per-stage operations go through
[crate::subrepo::SubRepository] handles obtained from [Repository::testing]
and [Repository::release].
*/

use {
    crate::{
        arch::Arch,
        cancel::CancelToken,
        error::{Result, RpmRepoError},
        package::Package,
        signing::{self, ArmoredKey, SigningKey},
        storage::{Stage, Storage},
        subrepo::{released_date, SubRepository},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::path::Path,
};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-zA-Z_\-]+$").expect("static regex"));

/// Per-repository policies.
#[derive(Clone, Debug, Default)]
pub struct RepositoryPolicy {
    /// Glob limiting which file names may be added.
    pub file_filter: Option<String>,
    /// Whether adding a file that is already present replaces it.
    pub replace: bool,
}

/// The top-level repository object.
pub struct Repository {
    name: String,
    default_arch: Arch,
    file_filter: Option<glob::Pattern>,
    replace: bool,
    signing_key: Option<SigningKey>,
    storage: Box<dyn Storage>,
}

impl Repository {
    /// Construct a repository over a storage backend.
    ///
    /// The name must match `[0-9a-zA-Z_\-]+`.
    pub fn new(name: &str, storage: Box<dyn Storage>, policy: RepositoryPolicy) -> Result<Self> {
        if !NAME_RE.is_match(name) {
            return Err(RpmRepoError::InvalidRepositoryName(name.to_string()));
        }

        let file_filter = match &policy.file_filter {
            Some(pattern) => Some(
                glob::Pattern::new(pattern)
                    .map_err(|_| RpmRepoError::InvalidFileFilter(pattern.clone()))?,
            ),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            default_arch: Arch::X86_64,
            file_filter,
            replace: policy.replace,
            signing_key: None,
            storage,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Architecture used when an operation does not supply one.
    pub fn default_arch(&self) -> Arch {
        self.default_arch
    }

    pub fn set_default_arch(&mut self, arch: Arch) {
        self.default_arch = arch;
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// The unstable staging sub-repository.
    pub fn testing(&self) -> SubRepository<'_> {
        SubRepository::new(self.storage.as_ref(), Stage::Testing)
    }

    /// The stable released sub-repository.
    pub fn release(&self) -> SubRepository<'_> {
        SubRepository::new(self.storage.as_ref(), Stage::Release)
    }

    pub fn sub_repository(&self, stage: Stage) -> SubRepository<'_> {
        SubRepository::new(self.storage.as_ref(), stage)
    }

    /// Whether both sub-repositories carry the architecture.
    pub fn has_arch(&self, arch: Arch) -> bool {
        self.storage.has_arch(Stage::Testing, arch) && self.storage.has_arch(Stage::Release, arch)
    }

    /// Create the directory tree for both stages.
    pub fn initialize(&self, arches: &[Arch]) -> Result<()> {
        self.storage.initialize(arches)
    }

    /// Load and retain the signing key.
    pub fn read_signing_key(&mut self, path: impl AsRef<Path>, password: Option<&str>) -> Result<()> {
        let armored = ArmoredKey::open(path)?;
        self.signing_key = Some(armored.read(password)?);

        Ok(())
    }

    /// Set an already-decoded signing key.
    pub fn set_signing_key(&mut self, key: SigningKey) {
        self.signing_key = Some(key);
    }

    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    /// Signing is required exactly when a key is configured.
    pub fn is_signing_required(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Add a package file to a stage.
    ///
    /// The architecture is derived from the file name suffix. The file
    /// must pass the repository's file filter (unless `ignore_filter`)
    /// and, when signing is required, must already carry a signature
    /// from the configured key.
    pub fn add_package(
        &self,
        stage: Stage,
        file: impl AsRef<Path>,
        ignore_filter: bool,
    ) -> Result<String> {
        let file = file.as_ref();

        let basename = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RpmRepoError::NotRpm(file.display().to_string()))?;

        let arch = Arch::from_filename(basename)?;

        if !ignore_filter {
            if let Some(filter) = &self.file_filter {
                if !filter.matches(basename) {
                    return Err(RpmRepoError::FileFilterRejected(basename.to_string()));
                }
            }
        }

        if let Some(key) = &self.signing_key {
            if !signing::is_package_signature_valid(file, key)? {
                return Err(RpmRepoError::SigningRequired(basename.to_string()));
            }
        }

        self.storage.add_package(stage, arch, file, self.replace)
    }

    /// Remove a stored package file from a stage.
    pub fn remove_package(&self, stage: Stage, arch: Arch, rel_path: &str) -> Result<()> {
        self.storage.remove_package(stage, arch, rel_path)
    }

    /// Copy a stored package between two stages of this repository,
    /// bit-identically. Promotion is `testing → release`. The copy of
    /// one package is a cancel-protected critical section.
    pub fn copy_package(
        &self,
        from: Stage,
        to: Stage,
        arch: Arch,
        rel_path: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.storage.copy_package(from, to, arch, rel_path, cancel)
    }

    /// Whether the package is present in the release stage, and when it
    /// was added there.
    ///
    /// Checks every architecture in the package's mask; the first
    /// matching row wins. "Not released" is a `None`, never an error.
    pub fn is_package_released(&self, package: &Package) -> Result<Option<i64>> {
        released_date(self.storage.as_ref(), package)
    }

    /// Delete the decompressed database caches and mark every depot
    /// cold.
    pub fn purge_cache(&self) -> Result<()> {
        self.storage.purge_cache()
    }
}
