// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository integrity checking.

Four phases run in order: cross-stage consistency, disk-vs-database
checksums, ownership and mode, signatures. Integrity findings are
collected as values rather than aborting the run; output truncates at a
configurable maximum.
*/

use {
    crate::{
        cancel::CancelToken,
        error::Result,
        io::file_sha256_hex,
        package::Package,
        repository::Repository,
        signing,
        storage::{PermissionsPolicy, Stage, Storage},
    },
    std::{
        fmt::{Display, Formatter},
        os::unix::fs::{MetadataExt, PermissionsExt},
        path::Path,
    },
};

/// The check phase an issue was found in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Released packages must be identical across the two stages.
    CrossStage,
    /// On-disk file checksums must match what the index recorded.
    Checksum,
    /// Files and directories must match the permissions policy.
    Permissions,
    /// Every package must be signed with the configured key.
    Signatures,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CrossStage => "cross-stage",
            Self::Checksum => "checksum",
            Self::Permissions => "permissions",
            Self::Signatures => "signatures",
        })
    }
}

/// One finding.
#[derive(Clone, Debug)]
pub struct IntegrityIssue {
    pub phase: Phase,
    pub message: String,
}

/// The collected findings of one check run.
#[derive(Clone, Debug, Default)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
    /// Whether collection stopped at the configured maximum.
    pub truncated: bool,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, max: usize, phase: Phase, message: String) -> bool {
        if self.issues.len() >= max {
            self.truncated = true;
            return false;
        }

        self.issues.push(IntegrityIssue { phase, message });
        true
    }
}

/// Runs the integrity phases over a repository.
pub struct IntegrityChecker<'a> {
    repo: &'a Repository,
    policy: PermissionsPolicy,
    max_issues: usize,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(repo: &'a Repository, policy: PermissionsPolicy) -> Self {
        Self {
            repo,
            policy,
            max_issues: 20,
        }
    }

    pub fn with_max_issues(mut self, max_issues: usize) -> Self {
        self.max_issues = max_issues;
        self
    }

    /// Run all four phases.
    pub fn check(&self, cancel: &CancelToken) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        let testing = self.repo.testing().list(None, true)?;
        let release = self.repo.release().list(None, true)?;

        let testing_packages = testing.packages().cloned().collect::<Vec<_>>();
        let release_packages = release.packages().cloned().collect::<Vec<_>>();

        self.check_cross_stage(&mut report, &testing_packages, &release_packages, cancel)?;
        self.check_checksums(&mut report, &testing_packages, Stage::Testing, cancel)?;
        self.check_checksums(&mut report, &release_packages, Stage::Release, cancel)?;
        self.check_permissions(&mut report, &testing_packages, Stage::Testing, cancel)?;
        self.check_permissions(&mut report, &release_packages, Stage::Release, cancel)?;
        self.check_signatures(&mut report, &testing_packages, Stage::Testing, cancel)?;
        self.check_signatures(&mut report, &release_packages, Stage::Release, cancel)?;

        Ok(report)
    }

    fn check_cross_stage(
        &self,
        report: &mut IntegrityReport,
        testing: &[Package],
        release: &[Package],
        cancel: &CancelToken,
    ) -> Result<()> {
        for t in testing {
            cancel.check()?;

            let Some(r) = release.iter().find(|r| r.same_identity(t)) else {
                continue;
            };

            if t.files.len() != r.files.len() {
                if !report.push(
                    self.max_issues,
                    Phase::CrossStage,
                    format!(
                        "{}: file count differs between testing ({}) and release ({})",
                        t.full_name(),
                        t.files.len(),
                        r.files.len()
                    ),
                ) {
                    return Ok(());
                }
            }

            for tf in &t.files {
                let Some(rf) = r.files.iter().find(|rf| rf.path == tf.path) else {
                    if !report.push(
                        self.max_issues,
                        Phase::CrossStage,
                        format!(
                            "{}: file {} present in testing but not in release",
                            t.full_name(),
                            tf.path
                        ),
                    ) {
                        return Ok(());
                    }
                    continue;
                };

                if tf.checksum != rf.checksum
                    && !report.push(
                        self.max_issues,
                        Phase::CrossStage,
                        format!(
                            "{}: checksum of {} differs between testing and release",
                            t.full_name(),
                            tf.path
                        ),
                    )
                {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn check_checksums(
        &self,
        report: &mut IntegrityReport,
        packages: &[Package],
        stage: Stage,
        cancel: &CancelToken,
    ) -> Result<()> {
        for package in packages {
            cancel.check()?;

            for file in &package.files {
                let path = self
                    .repo
                    .storage()
                    .package_path(stage, file.base_arch, &file.path)?;

                if !path.is_file() {
                    if !report.push(
                        self.max_issues,
                        Phase::Checksum,
                        format!("{}: {} is indexed but missing on disk", stage, file.path),
                    ) {
                        return Ok(());
                    }
                    continue;
                }

                let Some(expected) = file.checksum.get(..7) else {
                    continue;
                };

                let actual = file_sha256_hex(&path)?;

                if actual.get(..7) != Some(expected)
                    && !report.push(
                        self.max_issues,
                        Phase::Checksum,
                        format!(
                            "{}: {} does not match its recorded checksum",
                            stage, file.path
                        ),
                    )
                {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn mode_of(path: &Path) -> Result<(u32, u32)> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| crate::error::RpmRepoError::IoPath(path.display().to_string(), e))?;

        Ok((metadata.permissions().mode() & 0o7777, metadata.uid()))
    }

    fn check_permissions(
        &self,
        report: &mut IntegrityReport,
        packages: &[Package],
        stage: Stage,
        cancel: &CancelToken,
    ) -> Result<()> {
        let expected_uid = match &self.policy.user {
            Some(name) => nix::unistd::User::from_name(name)
                .ok()
                .flatten()
                .map(|u| u.uid.as_raw()),
            None => None,
        };

        for package in packages {
            cancel.check()?;

            for file in &package.files {
                let path = self
                    .repo
                    .storage()
                    .package_path(stage, file.base_arch, &file.path)?;

                if !path.is_file() {
                    continue;
                }

                let (mode, uid) = Self::mode_of(&path)?;

                if mode != self.policy.file_mode
                    && !report.push(
                        self.max_issues,
                        Phase::Permissions,
                        format!(
                            "{}: {} has mode {:o}, expected {:o}",
                            stage, file.path, mode, self.policy.file_mode
                        ),
                    )
                {
                    return Ok(());
                }

                if let Some(expected_uid) = expected_uid {
                    if uid != expected_uid
                        && !report.push(
                            self.max_issues,
                            Phase::Permissions,
                            format!("{}: {} has an unexpected owner", stage, file.path),
                        )
                    {
                        return Ok(());
                    }
                }

                if let Some(dir) = path.parent() {
                    let (mode, _) = Self::mode_of(dir)?;

                    if mode != self.policy.dir_mode
                        && !report.push(
                            self.max_issues,
                            Phase::Permissions,
                            format!(
                                "{}: directory of {} has mode {:o}, expected {:o}",
                                stage, file.path, mode, self.policy.dir_mode
                            ),
                        )
                    {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    fn check_signatures(
        &self,
        report: &mut IntegrityReport,
        packages: &[Package],
        stage: Stage,
        cancel: &CancelToken,
    ) -> Result<()> {
        let Some(key) = self.repo.signing_key() else {
            return Ok(());
        };

        for package in packages {
            cancel.check()?;

            for file in &package.files {
                let path = self
                    .repo
                    .storage()
                    .package_path(stage, file.base_arch, &file.path)?;

                if !path.is_file() {
                    continue;
                }

                let valid = match signing::is_package_signature_valid(&path, key) {
                    Ok(valid) => valid,
                    Err(_) => false,
                };

                if !valid
                    && !report.push(
                        self.max_issues,
                        Phase::Signatures,
                        format!(
                            "{}: {} is not signed with the configured key",
                            stage, file.path
                        ),
                    )
                {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
