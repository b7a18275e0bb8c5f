// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package data model.

[Package] is the unit of distribution. Packages sharing a source RPM are
grouped into a [PackageBundle]; an ordered list of bundles is a
[PackageStack], the canonical result type of list and search operations.
*/

use {
    crate::{
        arch::{Arch, ArchSet},
        version::compare_version,
    },
    std::cmp::Ordering,
};

/// A single stored package file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageFile {
    /// Storage-relative path of the file inside its depot.
    pub path: String,
    /// Architecture of the package content.
    pub arch: Arch,
    /// Architecture bucket the file is stored under.
    ///
    /// Equal to `arch` except for `noarch` packages, which are stored
    /// under a binary architecture directory.
    pub base_arch: Arch,
    /// Content checksum recorded by the index builder.
    pub checksum: String,
}

impl PackageFile {
    /// Base name of the stored file.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A dependency relation recorded for a package.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Dependency {
    pub name: String,
    /// Comparison flag as recorded in the database (`EQ`, `GE`, ...).
    pub flags: Option<String>,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
}

impl Dependency {
    /// Render the dependency the way `rpm -q --requires` does.
    pub fn to_display_string(&self) -> String {
        let mut s = self.name.clone();

        if let (Some(flags), Some(version)) = (&self.flags, &self.version) {
            let op = match flags.as_str() {
                "EQ" => "=",
                "LT" => "<",
                "LE" => "<=",
                "GT" => ">",
                "GE" => ">=",
                other => other,
            };

            s.push_str(&format!(" {} {}", op, version));

            if let Some(release) = &self.release {
                s.push_str(&format!("-{}", release));
            }
        }

        s
    }
}

/// The most recent changelog record of a package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangelogRecord {
    /// Record date as a UNIX timestamp.
    pub date: i64,
    pub author: String,
    pub text: String,
}

/// One payload (file listing) entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayloadEntry {
    pub path: String,
    pub is_dir: bool,
}

/// Extended package information hydrated from the metadata databases.
#[derive(Clone, Debug, Default)]
pub struct PackageInfo {
    pub summary: String,
    pub description: String,
    pub url: String,
    pub vendor: String,
    pub packager: String,
    pub group: String,
    pub license: String,
    /// Installed size in bytes.
    pub size_installed: u64,
    /// Packaged size in bytes.
    pub size_package: u64,
    /// Build time as a UNIX timestamp.
    pub built: i64,
    /// Time the package was added to the repository.
    pub added: i64,
    pub requires: Vec<Dependency>,
    pub provides: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub obsoletes: Vec<Dependency>,
    pub recommends: Vec<Dependency>,
    pub enhances: Vec<Dependency>,
    pub suggests: Vec<Dependency>,
    pub supplements: Vec<Dependency>,
    pub changelog: Option<ChangelogRecord>,
    pub payload: Vec<PayloadEntry>,
}

/// The unit of distribution.
#[derive(Clone, Debug, Default)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: String,
    /// Every architecture bucket under which this identical package is
    /// stored.
    pub arch_set: ArchSet,
    /// Source RPM file name: the package's own file name for a source
    /// package, otherwise the SRPM this binary was built from.
    pub src_rpm: String,
    pub files: Vec<PackageFile>,
    pub info: Option<PackageInfo>,
}

impl Package {
    /// `name-version-release` form of the package name.
    pub fn full_name(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }

    /// Whether two records describe the same package.
    ///
    /// Identity is the `(name, version, release, epoch)` tuple. The
    /// architecture mask is deliberately not part of identity.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.release == other.release
            && self.epoch == other.epoch
    }

    /// Whether this is a source package.
    pub fn is_source(&self) -> bool {
        self.arch_set.has(Arch::Src)
    }

    /// Merge another record of the same package into this one.
    ///
    /// Used when the same package shows up under several architecture
    /// buckets while listing: the architecture masks union and the file
    /// records concatenate.
    pub fn merge(&mut self, other: Package) {
        debug_assert!(self.same_identity(&other));

        self.arch_set |= other.arch_set;

        for file in other.files {
            if !self.files.contains(&file) {
                self.files.push(file);
            }
        }

        if self.info.is_none() {
            self.info = other.info;
        }
    }

    fn order_key_cmp(&self, other: &Self) -> Ordering {
        compare_version(&self.name, &other.name)
            .then_with(|| compare_version(&self.version, &other.version))
            .then_with(|| compare_version(&self.release, &other.release))
    }
}

/// A non-empty ordered list of packages sharing the same source RPM.
#[derive(Clone, Debug, Default)]
pub struct PackageBundle {
    pub packages: Vec<Package>,
}

impl PackageBundle {
    /// Source RPM file name the bundle is keyed by.
    pub fn source_rpm(&self) -> &str {
        self.packages
            .first()
            .map(|p| p.src_rpm.as_str())
            .unwrap_or("")
    }

    /// The package that defines the bundle's position in a stack.
    pub fn head(&self) -> Option<&Package> {
        self.packages.first()
    }

    /// Sort members: the source package first, then binaries by name.
    pub fn sort(&mut self) {
        self.packages.sort_by(|a, b| {
            b.is_source()
                .cmp(&a.is_source())
                .then_with(|| a.order_key_cmp(b))
        });
    }
}

/// An ordered list of bundles; the canonical list/search result.
#[derive(Clone, Debug, Default)]
pub struct PackageStack {
    pub bundles: Vec<PackageBundle>,
}

impl PackageStack {
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Total number of packages across bundles.
    pub fn package_count(&self) -> usize {
        self.bundles.iter().map(|b| b.packages.len()).sum()
    }

    /// Iterate over every package in stack order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.bundles.iter().flat_map(|b| b.packages.iter())
    }

    /// Sort bundles by their head package: name, then version, then
    /// release.
    pub fn sort(&mut self) {
        for bundle in &mut self.bundles {
            bundle.sort();
        }

        self.bundles.sort_by(|a, b| match (a.head(), b.head()) {
            (Some(a), Some(b)) => a.order_key_cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
}
