// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package architectures and architecture sets. */

use {
    crate::error::{Result, RpmRepoError},
    std::fmt::{Display, Formatter},
    strum::{EnumIter, IntoEnumIterator},
};

/// A package architecture known to the engine.
///
/// The enumeration is closed. Variants are declared in canonical display
/// order, which is also the order [ArchSet] renders its members in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, EnumIter)]
pub enum Arch {
    /// Source packages (`*.src.rpm`).
    Src,
    /// Architecture-independent packages.
    ///
    /// `noarch` has no storage directory of its own. Packages are stored
    /// under every binary architecture directory of the repository.
    Noarch,
    I386,
    I586,
    I686,
    X86_64,
    Aarch64,
    Ppc64,
    Ppc64Le,
    Arm,
    Armv7Hl,
}

impl Arch {
    /// Canonical architecture name as it appears in file names and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::Noarch => "noarch",
            Self::I386 => "i386",
            Self::I586 => "i586",
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Ppc64 => "ppc64",
            Self::Ppc64Le => "ppc64le",
            Self::Arm => "arm",
            Self::Armv7Hl => "armv7hl",
        }
    }

    /// Short tag used for display.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::Noarch => "noarch",
            Self::I386 => "x32",
            Self::I586 => "i586",
            Self::I686 => "i686",
            Self::X86_64 => "x64",
            Self::Aarch64 => "a64",
            Self::Ppc64 => "p64",
            Self::Ppc64Le => "p64l",
            Self::Arm => "arm",
            Self::Armv7Hl => "arm7",
        }
    }

    /// Storage directory name for this architecture.
    ///
    /// `None` for [Arch::Noarch], which is stored under the binary
    /// architecture directories instead of a directory of its own.
    pub fn dir(&self) -> Option<&'static str> {
        match self {
            Self::Src => Some("SRPMS"),
            Self::Noarch => None,
            Self::I386 => Some("i386"),
            Self::I586 => Some("i586"),
            Self::I686 => Some("i686"),
            Self::X86_64 => Some("x86_64"),
            Self::Aarch64 => Some("aarch64"),
            Self::Ppc64 => Some("ppc64"),
            Self::Ppc64Le => Some("ppc64le"),
            Self::Arm => Some("arm"),
            Self::Armv7Hl => Some("armv7hl"),
        }
    }

    /// Bit value of this architecture inside an [ArchSet].
    pub fn bit(&self) -> u16 {
        match self {
            Self::Src => 1 << 0,
            Self::Noarch => 1 << 1,
            Self::I386 => 1 << 2,
            Self::I586 => 1 << 3,
            Self::I686 => 1 << 4,
            Self::X86_64 => 1 << 5,
            Self::Aarch64 => 1 << 6,
            Self::Ppc64 => 1 << 7,
            Self::Ppc64Le => 1 << 8,
            Self::Arm => 1 << 9,
            Self::Armv7Hl => 1 << 10,
        }
    }

    /// Resolve an architecture from its canonical name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::iter()
            .find(|arch| arch.name() == name)
            .ok_or_else(|| RpmRepoError::UnknownArchitecture(name.to_string()))
    }

    /// Extract the architecture from the trailing `.<arch>.rpm` suffix of a
    /// package file name.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let stem = filename
            .strip_suffix(".rpm")
            .ok_or_else(|| RpmRepoError::NoArchitectureSuffix(filename.to_string()))?;

        let arch = stem
            .rsplit('.')
            .next()
            .ok_or_else(|| RpmRepoError::NoArchitectureSuffix(filename.to_string()))?;

        Self::from_name(arch)
            .map_err(|_| RpmRepoError::NoArchitectureSuffix(filename.to_string()))
    }

    /// Whether this is a binary architecture with a storage directory of its
    /// own (everything except `src` and `noarch`).
    pub fn is_binary(&self) -> bool {
        !matches!(self, Self::Src | Self::Noarch)
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of architectures, represented as a bitmask.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ArchSet(u16);

impl ArchSet {
    /// An empty set.
    pub fn new() -> Self {
        Self(0)
    }

    /// A set containing a single architecture.
    pub fn only(arch: Arch) -> Self {
        Self(arch.bit())
    }

    /// Whether the set contains the given architecture.
    pub fn has(&self, arch: Arch) -> bool {
        self.0 & arch.bit() != 0
    }

    /// Add an architecture to the set.
    pub fn add(&mut self, arch: Arch) {
        self.0 |= arch.bit();
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate members in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = Arch> + '_ {
        Arch::iter().filter(|arch| self.has(*arch))
    }

    /// Intersection of two sets.
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl std::ops::BitOrAssign for ArchSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<Arch> for ArchSet {
    fn from_iter<T: IntoIterator<Item = Arch>>(iter: T) -> Self {
        let mut set = Self::new();
        for arch in iter {
            set.add(arch);
        }
        set
    }
}

impl Display for ArchSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for arch in self.iter() {
            if !first {
                f.write_str("/")?;
            }
            f.write_str(arch.name())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_names() -> Result<()> {
        assert_eq!(Arch::from_name("x86_64")?, Arch::X86_64);
        assert_eq!(Arch::from_name("src")?, Arch::Src);
        assert!(Arch::from_name("mips").is_err());

        Ok(())
    }

    #[test]
    fn parse_filenames() -> Result<()> {
        assert_eq!(
            Arch::from_filename("test-package-1.0.0-0.el7.x86_64.rpm")?,
            Arch::X86_64
        );
        assert_eq!(
            Arch::from_filename("test-package-1.0.0-0.el7.src.rpm")?,
            Arch::Src
        );
        assert!(Arch::from_filename("test-package-1.0.0-0.el7.rpm").is_err());
        assert!(Arch::from_filename("not-an-rpm.tar.gz").is_err());

        Ok(())
    }

    #[test]
    fn set_operations() {
        let mut set = ArchSet::new();
        assert!(set.is_empty());

        set.add(Arch::X86_64);
        set.add(Arch::Noarch);
        assert!(set.has(Arch::X86_64));
        assert!(set.has(Arch::Noarch));
        assert!(!set.has(Arch::Aarch64));

        set |= ArchSet::only(Arch::Aarch64);
        assert!(set.has(Arch::Aarch64));
    }

    #[test]
    fn display_uses_canonical_order() {
        let set = ArchSet::from_iter([Arch::X86_64, Arch::Src, Arch::Noarch]);
        assert_eq!(set.to_string(), "src/noarch/x86_64");
    }
}
