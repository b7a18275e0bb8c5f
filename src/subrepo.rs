// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Sub-repository operations.

A [SubRepository] is the per-stage operational façade: listing,
searching, package info, reindexing and statistics. Queries run per
architecture against that architecture's databases; the per-architecture
results are merged into a single [PackageStack].
*/

use {
    crate::{
        arch::{Arch, ArchSet},
        cancel::CancelToken,
        db::DbType,
        error::{Result, RpmRepoError},
        package::{
            ChangelogRecord, Dependency, Package, PackageBundle, PackageFile, PackageInfo,
            PackageStack, PayloadEntry,
        },
        query::{Query, TermOp},
        storage::{Stage, Storage},
        version::compare_evr,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    rusqlite::Connection,
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        rc::Rc,
        sync::mpsc,
    },
};

static LIST_FILTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.+-]+$").expect("static regex"));

/// Per-architecture aggregate numbers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ArchStats {
    pub packages: u64,
    pub bytes: u64,
}

/// Aggregate statistics over one sub-repository.
#[derive(Clone, Debug, Default)]
pub struct RepositoryStats {
    pub arches: BTreeMap<Arch, ArchStats>,
    pub packages: u64,
    pub bytes: u64,
    /// Most recent `repomd.xml` modification time across architectures.
    pub updated: i64,
}

/// Open a depot database, retrying once through a cache invalidation.
///
/// A failed open usually means the cache went stale underneath us (for
/// example a concurrent purge); the second attempt re-materializes it.
pub(crate) fn open_db(
    storage: &dyn Storage,
    stage: Stage,
    arch: Arch,
    db_type: DbType,
) -> Result<Rc<Connection>> {
    match storage.db(stage, arch, db_type) {
        Ok(conn) => Ok(conn),
        Err(first) => {
            log::warn!(
                "database open failed for {}/{} ({}); invalidating cache and retrying: {}",
                stage,
                arch,
                db_type.short_name(),
                first
            );

            storage.invalidate_cache(stage, arch);
            storage.db(stage, arch, db_type)
        }
    }
}

/// Release date of a package, when an identical `(name, version,
/// release, epoch)` row exists in the release stage.
///
/// Checked per architecture in the package's mask; the first match wins.
/// "Not released" is not an error.
pub(crate) fn released_date(storage: &dyn Storage, package: &Package) -> Result<Option<i64>> {
    for arch in package.arch_set.iter() {
        if !storage.has_arch(Stage::Release, arch) {
            continue;
        }

        if storage.mod_time(Stage::Release, arch).is_err() {
            // Never indexed; nothing can be released there.
            continue;
        }

        let conn = open_db(storage, Stage::Release, arch, DbType::Primary)?;

        let mut statement = conn.prepare_cached(
            "SELECT time_file FROM packages
             WHERE name = ?1 AND version = ?2 AND release = ?3
               AND COALESCE(epoch, '0') = ?4",
        )?;

        let mut rows = statement.query(rusqlite::params![
            package.name,
            package.version,
            package.release,
            package.epoch,
        ])?;

        if let Some(row) = rows.next()? {
            return Ok(Some(row.get(0)?));
        }
    }

    Ok(None)
}

/// One hydrated row of the primary `packages` table.
struct PrimaryRow {
    pkg_key: i64,
    pkgid: String,
    name: String,
    arch: String,
    version: String,
    epoch: String,
    release: String,
    sourcerpm: String,
    href: String,
}

const PRIMARY_COLUMNS: &str =
    "pkgKey, pkgId, name, arch, version, COALESCE(epoch, '0'), release, \
     COALESCE(rpm_sourcerpm, ''), location_href";

fn primary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrimaryRow> {
    Ok(PrimaryRow {
        pkg_key: row.get(0)?,
        pkgid: row.get(1)?,
        name: row.get(2)?,
        arch: row.get(3)?,
        version: row.get(4)?,
        epoch: row.get(5)?,
        release: row.get(6)?,
        sourcerpm: row.get(7)?,
        href: row.get(8)?,
    })
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl PrimaryRow {
    /// The bundle key: the source RPM file name.
    fn bundle_key(&self) -> String {
        if self.arch == "src" {
            return basename(&self.href).to_string();
        }

        if !self.sourcerpm.is_empty() {
            return self.sourcerpm.clone();
        }

        format!("{}-{}-{}.src.rpm", self.name, self.version, self.release)
    }

    fn into_package(self, base_arch: Arch) -> Package {
        let file_arch = Arch::from_name(&self.arch).unwrap_or(base_arch);
        let key = self.bundle_key();

        Package {
            files: vec![PackageFile {
                path: self.href,
                arch: file_arch,
                base_arch,
                checksum: self.pkgid,
            }],
            name: self.name,
            version: self.version,
            release: self.release,
            epoch: self.epoch,
            arch_set: ArchSet::only(base_arch),
            src_rpm: key,
            info: None,
        }
    }
}

/// Per-stage façade over the storage.
pub struct SubRepository<'a> {
    storage: &'a dyn Storage,
    stage: Stage,
}

impl<'a> SubRepository<'a> {
    pub fn new(storage: &'a dyn Storage, stage: Stage) -> Self {
        Self { storage, stage }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Architectures this sub-repository has depots for.
    pub fn arches(&self) -> Vec<Arch> {
        self.storage.arches(self.stage)
    }

    pub fn has_arch(&self, arch: Arch) -> bool {
        self.storage.has_arch(self.stage, arch)
    }

    /// Whether a package file with the given base name exists in the
    /// depot of the architecture.
    pub fn has_package_file(&self, arch: Arch, basename: &str) -> Result<bool> {
        self.storage.has_package(self.stage, arch, basename)
    }

    /// Whether the depot has been indexed at least once.
    fn has_repodata(&self, arch: Arch) -> bool {
        self.storage.mod_time(self.stage, arch).is_ok()
    }

    fn db(&self, arch: Arch, db_type: DbType) -> Result<Rc<Connection>> {
        open_db(self.storage, self.stage, arch, db_type)
    }

    /// List packages.
    ///
    /// With `all` false and no filter, only the latest version of every
    /// package name is returned. A filter is a case-insensitive
    /// substring of the `name-version-release` form; it must be at
    /// least 3 characters of `[A-Za-z0-9_.+-]`.
    pub fn list(&self, filter: Option<&str>, all: bool) -> Result<PackageStack> {
        if let Some(filter) = filter {
            if filter.len() < 3 {
                return Err(RpmRepoError::ListFilterTooShort);
            }

            if !LIST_FILTER_RE.is_match(filter) {
                return Err(RpmRepoError::ListFilterIllegalChar(filter.to_string()));
            }
        }

        let mut packages: Vec<Package> = vec![];

        for arch in self.arches() {
            if !self.has_repodata(arch) {
                log::debug!("{}/{} has no repodata yet; skipping", self.stage, arch);
                continue;
            }

            let conn = self.db(arch, DbType::Primary)?;

            let sql = match filter {
                Some(_) => format!(
                    "SELECT {} FROM packages
                     WHERE instr(lower(name || '-' || version || '-' || release), ?1) > 0",
                    PRIMARY_COLUMNS
                ),
                None => format!("SELECT {} FROM packages", PRIMARY_COLUMNS),
            };

            let mut statement = conn.prepare_cached(&sql)?;

            let rows = match filter {
                Some(filter) => statement
                    .query_map([filter.to_lowercase()], primary_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => statement
                    .query_map([], primary_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };

            merge_rows(&mut packages, rows, arch);
        }

        if !all && filter.is_none() {
            packages = latest_only(packages);
        }

        Ok(build_stack(packages))
    }

    /// Search with a parsed query.
    ///
    /// Positive terms intersect, negative terms subtract, per
    /// architecture. An architecture whose candidate set runs empty is
    /// dropped; the others continue. Filter terms apply to the hydrated
    /// packages at the end.
    pub fn find(&self, query: &Query) -> Result<PackageStack> {
        let now = chrono::Utc::now().timestamp();
        let mut packages: Vec<Package> = vec![];

        for arch in self.arches() {
            if !self.has_repodata(arch) {
                continue;
            }

            let primary = self.db(arch, DbType::Primary)?;

            let mut candidates: HashSet<i64> = {
                let mut statement = primary.prepare_cached("SELECT pkgKey FROM packages")?;
                let keys = statement.query_map([], |row| row.get::<_, i64>(0))?;
                keys.collect::<rusqlite::Result<_>>()?
            };

            for term in &query.terms {
                let Some((db_type, fragments)) = term.sql(now) else {
                    continue;
                };

                let conn = if db_type == DbType::Primary {
                    Rc::clone(&primary)
                } else {
                    self.db(arch, db_type)?
                };

                let mut matched = HashSet::new();
                for fragment in fragments {
                    let mut statement = conn.prepare(&fragment)?;
                    for key in statement.query_map([], |row| row.get::<_, i64>(0))? {
                        matched.insert(key?);
                    }
                }

                match term.op {
                    TermOp::Include => candidates.retain(|k| matched.contains(k)),
                    TermOp::Exclude => candidates.retain(|k| !matched.contains(k)),
                }

                if candidates.is_empty() {
                    break;
                }
            }

            if candidates.is_empty() {
                continue;
            }

            let rows = fetch_rows_by_key(&primary, &candidates)?;
            merge_rows(&mut packages, rows, arch);
        }

        if let Some(wanted) = query.released_filter() {
            let mut kept = vec![];
            for package in packages {
                let released = released_date(self.storage, &package)?.is_some();
                if released == wanted {
                    kept.push(package);
                }
            }
            packages = kept;
        }

        Ok(build_stack(packages))
    }

    /// Detailed information about the most recent package whose full
    /// name starts with `name`, plus its release date when the same
    /// package exists in the release stage.
    pub fn info(&self, name: &str, arch: Arch) -> Result<Option<(Package, Option<i64>)>> {
        if !self.has_repodata(arch) {
            return Ok(None);
        }

        let conn = self.db(arch, DbType::Primary)?;

        let mut statement = conn.prepare_cached(&format!(
            "SELECT {} FROM packages
             WHERE name = ?1
                OR (name || '-' || version || '-' || release) LIKE ?1 || '%'",
            PRIMARY_COLUMNS
        ))?;

        let rows = statement
            .query_map([name], primary_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Prefer exact name matches, then the most recent version.
        let row = rows
            .into_iter()
            .max_by(|a, b| {
                (a.name == name)
                    .cmp(&(b.name == name))
                    .then_with(|| {
                        compare_evr(
                            (&a.epoch, &a.version, &a.release),
                            (&b.epoch, &b.version, &b.release),
                        )
                    })
            });

        let Some(row) = row else {
            return Ok(None);
        };

        let pkg_key = row.pkg_key;
        let mut package = row.into_package(arch);
        package.info = Some(self.hydrate_info(arch, pkg_key, &conn)?);

        let released = released_date(self.storage, &package)?;

        Ok(Some((package, released)))
    }

    fn hydrate_info(
        &self,
        arch: Arch,
        pkg_key: i64,
        primary: &Connection,
    ) -> Result<PackageInfo> {
        let mut info = primary.query_row(
            "SELECT COALESCE(summary, ''), COALESCE(description, ''),
                    COALESCE(url, ''), COALESCE(rpm_vendor, ''),
                    COALESCE(rpm_packager, ''), COALESCE(rpm_group, ''),
                    COALESCE(rpm_license, ''), COALESCE(size_installed, 0),
                    COALESCE(size_package, 0), COALESCE(time_build, 0),
                    COALESCE(time_file, 0)
             FROM packages WHERE pkgKey = ?1",
            [pkg_key],
            |row| {
                Ok(PackageInfo {
                    summary: row.get(0)?,
                    description: row.get(1)?,
                    url: row.get(2)?,
                    vendor: row.get(3)?,
                    packager: row.get(4)?,
                    group: row.get(5)?,
                    license: row.get(6)?,
                    size_installed: row.get(7)?,
                    size_package: row.get(8)?,
                    built: row.get(9)?,
                    added: row.get(10)?,
                    ..Default::default()
                })
            },
        )?;

        info.requires = fetch_dependencies(primary, "requires", pkg_key)?;
        info.provides = fetch_dependencies(primary, "provides", pkg_key)?;
        info.conflicts = fetch_dependencies(primary, "conflicts", pkg_key)?;
        info.obsoletes = fetch_dependencies(primary, "obsoletes", pkg_key)?;
        info.recommends = fetch_dependencies(primary, "recommends", pkg_key)?;
        info.enhances = fetch_dependencies(primary, "enhances", pkg_key)?;
        info.suggests = fetch_dependencies(primary, "suggests", pkg_key)?;
        info.supplements = fetch_dependencies(primary, "supplements", pkg_key)?;

        if let Ok(other) = self.db(arch, DbType::Other) {
            info.changelog = latest_changelog(&other, pkg_key)?;
        }

        if let Ok(filelists) = self.db(arch, DbType::Filelists) {
            info.payload = fetch_payload(&filelists, pkg_key)?;
        }

        Ok(info)
    }

    /// Rebuild the repodata for every architecture of this stage.
    ///
    /// The architecture name is sent to `progress` before each builder
    /// run starts. Architectures rebuild independently: a per-arch
    /// failure does not stop the remaining ones, and the first failure
    /// is reported once every architecture has been attempted. A cancel
    /// takes effect between architectures.
    pub fn reindex(
        &self,
        full: bool,
        progress: Option<&mpsc::Sender<String>>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut first_error = None;

        for arch in self.arches() {
            cancel.check()?;

            if let Some(progress) = progress {
                let _ = progress.send(arch.name().to_string());
            }

            if let Err(e) = self.storage.reindex(self.stage, arch, full, progress) {
                log::warn!("reindex of {}/{} failed: {}", self.stage, arch, e);

                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Aggregate statistics across architectures.
    pub fn stats(&self) -> Result<RepositoryStats> {
        let mut stats = RepositoryStats::default();

        for arch in self.arches() {
            if !self.has_repodata(arch) {
                continue;
            }

            let conn = self.db(arch, DbType::Primary)?;

            let (packages, bytes) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_package), 0) FROM packages",
                [],
                |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
            )?;

            stats.arches.insert(arch, ArchStats { packages, bytes });
            stats.packages += packages;
            stats.bytes += bytes;

            let updated = self.storage.mod_time(self.stage, arch)?;
            stats.updated = stats.updated.max(updated);
        }

        Ok(stats)
    }

    /// Plan a cleanup: the files of every version older than the `keep`
    /// newest per package name, optionally limited to names starting
    /// with `name_filter`.
    ///
    /// The caller removes the files and reindexes; the plan itself
    /// mutates nothing. The cancel token is polled between package
    /// names.
    pub fn cleanup_plan(
        &self,
        keep: usize,
        name_filter: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Vec<PackageFile>> {
        if keep < 3 {
            return Err(RpmRepoError::CleanupKeepTooSmall(keep));
        }

        let stack = self.list(None, true)?;

        let mut by_name: HashMap<String, Vec<Package>> = HashMap::new();
        for package in stack.packages() {
            if let Some(prefix) = name_filter {
                if !package.name.starts_with(prefix) {
                    continue;
                }
            }

            by_name
                .entry(package.name.clone())
                .or_default()
                .push(package.clone());
        }

        let mut plan = vec![];

        for (_, mut versions) in by_name {
            cancel.check()?;

            versions.sort_by(|a, b| {
                compare_evr(
                    (&b.epoch, &b.version, &b.release),
                    (&a.epoch, &a.version, &a.release),
                )
            });

            for old in versions.into_iter().skip(keep) {
                plan.extend(old.files);
            }
        }

        plan.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(plan)
    }
}

/// Merge hydrated rows into the accumulated package list, unioning the
/// architecture mask of identical packages.
fn merge_rows(packages: &mut Vec<Package>, rows: Vec<PrimaryRow>, base_arch: Arch) {
    for row in rows {
        let package = row.into_package(base_arch);

        if let Some(existing) = packages.iter_mut().find(|p| p.same_identity(&package)) {
            existing.merge(package);
        } else {
            packages.push(package);
        }
    }
}

/// Keep only the most recent version of every package name.
fn latest_only(packages: Vec<Package>) -> Vec<Package> {
    let mut latest: HashMap<String, Package> = HashMap::new();

    for package in packages {
        match latest.get(&package.name) {
            Some(existing)
                if compare_evr(
                    (&existing.epoch, &existing.version, &existing.release),
                    (&package.epoch, &package.version, &package.release),
                ) >= std::cmp::Ordering::Equal => {}
            _ => {
                latest.insert(package.name.clone(), package);
            }
        }
    }

    latest.into_values().collect()
}

/// Group packages into bundles by source RPM and sort the stack.
fn build_stack(packages: Vec<Package>) -> PackageStack {
    let mut bundles: Vec<(String, PackageBundle)> = vec![];

    for package in packages {
        let key = package.src_rpm.clone();

        match bundles.iter_mut().find(|(k, _)| *k == key) {
            Some((_, bundle)) => bundle.packages.push(package),
            None => bundles.push((
                key,
                PackageBundle {
                    packages: vec![package],
                },
            )),
        }
    }

    let mut stack = PackageStack {
        bundles: bundles.into_iter().map(|(_, b)| b).collect(),
    };
    stack.sort();

    stack
}

fn fetch_rows_by_key(conn: &Connection, keys: &HashSet<i64>) -> Result<Vec<PrimaryRow>> {
    let mut rows = vec![];

    let mut sorted = keys.iter().copied().collect::<Vec<_>>();
    sorted.sort_unstable();

    // Keys are integers; embedding them keeps us clear of the bound
    // parameter limit.
    for chunk in sorted.chunks(500) {
        let list = chunk
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT {} FROM packages WHERE pkgKey IN ({})",
            PRIMARY_COLUMNS, list
        );

        let mut statement = conn.prepare(&sql)?;
        for row in statement.query_map([], primary_row)? {
            rows.push(row?);
        }
    }

    Ok(rows)
}

fn fetch_dependencies(conn: &Connection, table: &str, pkg_key: i64) -> Result<Vec<Dependency>> {
    let mut statement = conn.prepare_cached(&format!(
        "SELECT name, flags, epoch, version, release FROM {} WHERE pkgKey = ?1",
        table
    ))?;

    let deps = statement.query_map([pkg_key], |row| {
        Ok(Dependency {
            name: row.get(0)?,
            flags: row.get(1)?,
            epoch: row.get(2)?,
            version: row.get(3)?,
            release: row.get(4)?,
        })
    })?;

    Ok(deps.collect::<rusqlite::Result<_>>()?)
}

fn latest_changelog(conn: &Connection, pkg_key: i64) -> Result<Option<ChangelogRecord>> {
    let mut statement = conn.prepare_cached(
        "SELECT author, date, changelog FROM changelog
         WHERE pkgKey = ?1 ORDER BY date DESC LIMIT 1",
    )?;

    let mut rows = statement.query([pkg_key])?;

    Ok(match rows.next()? {
        Some(row) => Some(ChangelogRecord {
            author: row.get(0)?,
            date: row.get(1)?,
            text: row.get(2)?,
        }),
        None => None,
    })
}

fn fetch_payload(conn: &Connection, pkg_key: i64) -> Result<Vec<PayloadEntry>> {
    let mut statement = conn.prepare_cached(
        "SELECT dirname, filenames, filetypes FROM filelist WHERE pkgKey = ?1",
    )?;

    let mut entries = vec![];

    let rows = statement.query_map([pkg_key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    for row in rows {
        let (dirname, filenames, filetypes) = row?;

        for (name, ftype) in filenames.split('/').zip(filetypes.chars()) {
            if name.is_empty() {
                continue;
            }

            entries.push(PayloadEntry {
                path: format!("{}/{}", dirname.trim_end_matches('/'), name),
                is_dir: ftype == 'd',
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(entries)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            db::fixture::PrimaryRow as FixtureRow,
            storage::local::{test as local_test, LocalStorage},
        },
        tempfile::TempDir,
    };

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// A storage with nginx 1.21.3 / 1.19.6 and a source package in
    /// testing, and nginx 1.19.6 released.
    fn fixture_storage(root: &TempDir) -> LocalStorage {
        let storage = LocalStorage::new(
            "test",
            &[Arch::Src, Arch::X86_64],
            local_test::storage_options(root.path()),
        )
        .unwrap();
        storage.initialize(&[Arch::Src, Arch::X86_64]).unwrap();

        let ts = now() - 300;

        let testing = storage.data_path(Stage::Testing, Arch::X86_64).unwrap();
        local_test::write_repodata(
            &testing,
            &[
                FixtureRow::new("nginx", "1.21.3", "1.el7", "x86_64").with_dep(
                    "requires",
                    "mylib",
                    Some("GE"),
                    Some("1.16"),
                ),
                FixtureRow::new("nginx", "1.19.6", "1.el7", "x86_64"),
                FixtureRow::new("zsh", "5.8", "2.el7", "x86_64"),
            ],
            &[(1, "/usr/bin", "nginx", "f"), (1, "/etc/nginx", "nginx.conf", "f")],
            &[(1, "dev <dev@example.com>", ts, "- rebuilt")],
            ts,
        );

        let srpms = storage.data_path(Stage::Testing, Arch::Src).unwrap();
        local_test::write_repodata(
            &srpms,
            &[FixtureRow::new("nginx", "1.21.3", "1.el7", "src")],
            &[],
            &[],
            ts,
        );

        let release = storage.data_path(Stage::Release, Arch::X86_64).unwrap();
        local_test::write_repodata(
            &release,
            &[FixtureRow::new("nginx", "1.19.6", "1.el7", "x86_64")],
            &[],
            &[],
            ts,
        );

        storage
    }

    #[test]
    fn list_latest_only() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.list(None, false)?;

        let names = stack
            .packages()
            .map(|p| p.full_name())
            .collect::<Vec<_>>();

        // nginx 1.19.6 is superseded by 1.21.3.
        assert!(names.contains(&"nginx-1.21.3-1.el7".to_string()));
        assert!(!names.contains(&"nginx-1.19.6-1.el7".to_string()));
        assert!(names.contains(&"zsh-5.8-2.el7".to_string()));

        Ok(())
    }

    #[test]
    fn list_all_versions_and_ordering() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.list(None, true)?;

        let heads = stack
            .bundles
            .iter()
            .map(|b| b.head().unwrap().full_name())
            .collect::<Vec<_>>();

        assert_eq!(
            heads,
            vec![
                "nginx-1.19.6-1.el7",
                "nginx-1.21.3-1.el7",
                "zsh-5.8-2.el7"
            ]
        );

        Ok(())
    }

    #[test]
    fn list_bundles_source_with_binaries() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.list(None, true)?;

        let bundle = stack
            .bundles
            .iter()
            .find(|b| b.source_rpm() == "nginx-1.21.3-1.el7.src.rpm")
            .unwrap();

        // The source and binary rows share (name, version, release,
        // epoch), so they merge into one package spanning both buckets.
        assert_eq!(bundle.packages.len(), 1);
        let package = &bundle.packages[0];
        assert!(package.arch_set.has(Arch::Src));
        assert!(package.arch_set.has(Arch::X86_64));
        assert_eq!(package.arch_set.to_string(), "src/x86_64");
        assert_eq!(package.files.len(), 2);

        Ok(())
    }

    #[test]
    fn list_filter_rules() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        assert!(matches!(
            testing.list(Some("ng"), false),
            Err(RpmRepoError::ListFilterTooShort)
        ));
        assert!(matches!(
            testing.list(Some("ngi nx"), false),
            Err(RpmRepoError::ListFilterIllegalChar(_))
        ));

        let stack = testing.list(Some("NGINX"), false)?;
        assert!(stack.packages().all(|p| p.name == "nginx"));
        assert!(!stack.is_empty());

        Ok(())
    }

    #[test]
    fn find_with_negation() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.find(&Query::parse("n:nginx v::1.19.6")?)?;

        let names = stack
            .packages()
            .map(|p| p.full_name())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["nginx-1.21.3-1.el7"]);

        Ok(())
    }

    #[test]
    fn find_by_dependency() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.find(&Query::parse("R:mylib>=1.16")?)?;
        assert!(stack
            .packages()
            .any(|p| p.full_name() == "nginx-1.21.3-1.el7"));

        let stack = testing.find(&Query::parse("R:mylib>=1.17")?)?;
        assert!(stack.is_empty());

        Ok(())
    }

    #[test]
    fn find_by_file() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.find(&Query::parse("f:/usr/bin/nginx")?)?;
        assert!(stack
            .packages()
            .any(|p| p.full_name() == "nginx-1.21.3-1.el7"));

        let stack = testing.find(&Query::parse("@:nginx.conf")?)?;
        assert!(!stack.is_empty());

        Ok(())
    }

    #[test]
    fn find_released_filter() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stack = testing.find(&Query::parse("n:nginx ^:yes")?)?;
        let names = stack
            .packages()
            .map(|p| p.full_name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["nginx-1.19.6-1.el7"]);

        let stack = testing.find(&Query::parse("n:nginx ^:no")?)?;
        assert!(stack
            .packages()
            .all(|p| p.full_name() != "nginx-1.19.6-1.el7"));

        Ok(())
    }

    #[test]
    fn info_hydrates_details() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let (package, released) = testing.info("nginx", Arch::X86_64)?.unwrap();

        assert_eq!(package.full_name(), "nginx-1.21.3-1.el7");

        let info = package.info.as_ref().unwrap();
        assert_eq!(info.summary, "nginx summary");
        assert_eq!(info.requires.len(), 1);
        assert_eq!(info.requires[0].to_display_string(), "mylib >= 1.16");
        assert!(info.changelog.is_some());
        assert!(info
            .payload
            .iter()
            .any(|e| e.path == "/usr/bin/nginx"));

        // 1.21.3 is not in the release stage.
        assert!(released.is_none());

        Ok(())
    }

    #[test]
    fn released_date_for_released_package() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);

        let package = Package {
            name: "nginx".to_string(),
            version: "1.19.6".to_string(),
            release: "1.el7".to_string(),
            epoch: "0".to_string(),
            arch_set: ArchSet::only(Arch::X86_64),
            ..Default::default()
        };

        assert!(released_date(&storage, &package)?.is_some());

        let package = Package {
            version: "1.21.3".to_string(),
            ..package
        };
        assert!(released_date(&storage, &package)?.is_none());

        Ok(())
    }

    #[test]
    fn stats_aggregates() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root);
        let testing = SubRepository::new(&storage, Stage::Testing);

        let stats = testing.stats()?;

        assert_eq!(stats.arches[&Arch::X86_64].packages, 3);
        assert_eq!(stats.packages, 4); // 3 binaries + 1 source
        assert!(stats.bytes > 0);
        assert!(stats.updated > 0);

        Ok(())
    }

    #[test]
    fn cleanup_plan_keeps_newest() -> Result<()> {
        let root = TempDir::new()?;
        let storage = LocalStorage::new(
            "test",
            &[Arch::X86_64],
            local_test::storage_options(root.path()),
        )
        .unwrap();
        storage.initialize(&[Arch::X86_64]).unwrap();

        let rows = (0..5)
            .map(|i| FixtureRow::new("tool", &format!("1.{}.0", i), "1.el7", "x86_64"))
            .collect::<Vec<_>>();

        let testing_dir = storage.data_path(Stage::Testing, Arch::X86_64).unwrap();
        local_test::write_repodata(&testing_dir, &rows, &[], &[], now() - 60);

        let testing = SubRepository::new(&storage, Stage::Testing);
        let cancel = CancelToken::new();

        assert!(matches!(
            testing.cleanup_plan(2, None, &cancel),
            Err(RpmRepoError::CleanupKeepTooSmall(2))
        ));

        let plan = testing.cleanup_plan(3, None, &cancel)?;
        let paths = plan.iter().map(|f| f.path.as_str()).collect::<Vec<_>>();

        // 1.4, 1.3, 1.2 stay; 1.1 and 1.0 go.
        assert_eq!(
            paths,
            vec![
                "tool-1.0.0-1.el7.x86_64.rpm",
                "tool-1.1.0-1.el7.x86_64.rpm"
            ]
        );

        let none = testing.cleanup_plan(3, Some("other"), &cancel)?;
        assert!(none.is_empty());

        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert!(matches!(
            testing.cleanup_plan(3, None, &cancelled),
            Err(RpmRepoError::Cancelled)
        ));

        Ok(())
    }

    #[test]
    fn reindex_streams_arch_names() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root).with_index_program("true");
        let testing = SubRepository::new(&storage, Stage::Testing);

        let (tx, rx) = mpsc::channel();
        testing.reindex(false, Some(&tx), &CancelToken::new())?;
        drop(tx);

        let lines = rx.into_iter().collect::<Vec<_>>();
        assert!(lines.contains(&"src".to_string()));
        assert!(lines.contains(&"x86_64".to_string()));

        Ok(())
    }

    #[test]
    fn reindex_honors_cancel() -> Result<()> {
        let root = TempDir::new()?;
        let storage = fixture_storage(&root).with_index_program("true");
        let testing = SubRepository::new(&storage, Stage::Testing);

        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            testing.reindex(false, None, &cancel),
            Err(RpmRepoError::Cancelled)
        ));

        Ok(())
    }
}
