// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM file detection and header probing. */

use {
    crate::{
        arch::Arch,
        error::{Result, RpmRepoError},
    },
    std::{io::Read, path::Path},
};

/// The 4-byte magic at the start of every RPM lead.
const RPM_LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];

/// Whether the file at `path` looks like an RPM package.
///
/// Only the lead magic is consulted; the header is not parsed.
pub fn is_rpm(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();

    let mut fh = std::fs::File::open(path)
        .map_err(|e| RpmRepoError::IoPath(path.display().to_string(), e))?;

    let mut magic = [0u8; 4];
    match fh.read_exact(&mut magic) {
        Ok(()) => Ok(magic == RPM_LEAD_MAGIC),
        // Shorter than a lead: not an RPM, not an error.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(RpmRepoError::IoPath(path.display().to_string(), e)),
    }
}

/// Read the architecture a package was built for from its header.
///
/// Returns [Arch::Src] when the header carries no source RPM reference,
/// i.e. the file is itself a source package.
pub fn read_arch(path: impl AsRef<Path>) -> Result<Arch> {
    let path = path.as_ref();

    let package = rpm::Package::open(path)?;

    if package.metadata.is_source_package() {
        return Ok(Arch::Src);
    }

    let arch = package.metadata.get_arch()?;

    Arch::from_name(arch)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn build_test_rpm(name: &str, version: &str, release: &str) -> rpm::Package {
        rpm::PackageBuilder::new(name, version, "MIT", "x86_64", "a test package")
            .release(release)
            .build()
            .expect("building in-memory test package")
    }

    #[test]
    fn detects_rpm_lead() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let rpm_path = dir.path().join("test-package-1.0.0-0.el7.x86_64.rpm");
        let mut fh = std::fs::File::create(&rpm_path)?;
        build_test_rpm("test-package", "1.0.0", "0.el7")
            .write(&mut fh)
            .unwrap();
        drop(fh);

        assert!(is_rpm(&rpm_path)?);

        let other = dir.path().join("not-an-rpm.rpm");
        std::fs::write(&other, b"definitely not a package")?;
        assert!(!is_rpm(&other)?);

        let tiny = dir.path().join("tiny");
        std::fs::write(&tiny, b"ab")?;
        assert!(!is_rpm(&tiny)?);

        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(is_rpm("/nonexistent/definitely/missing.rpm").is_err());
    }

    #[test]
    fn reads_binary_arch() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let rpm_path = dir.path().join("test-package-1.0.0-0.el7.x86_64.rpm");
        let mut fh = std::fs::File::create(&rpm_path)?;
        build_test_rpm("test-package", "1.0.0", "0.el7")
            .write(&mut fh)
            .unwrap();
        drop(fh);

        assert_eq!(read_arch(&rpm_path)?, Arch::X86_64);

        Ok(())
    }
}
