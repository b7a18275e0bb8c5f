// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers: compression, SQLite unpacking, content digests. */

use {
    crate::error::{Result, RpmRepoError},
    std::{
        fmt::Formatter,
        io::{Read, Write},
        path::Path,
    },
};

/// Leading bytes of every SQLite 3 database file.
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Compression format of a repodata file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Compression {
    /// No compression.
    None,
    /// Gzip compression (`.gz`).
    Gzip,
    /// Bzip2 compression (`.bz2`).
    Bzip2,
    /// Xz compression (`.xz`).
    Xz,
    /// Zstd compression (`.zst`).
    Zstd,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
            Self::Zstd => ".zst",
        }
    }

    /// Detect the compression format from a file name suffix.
    ///
    /// An uncompressed `.sqlite` or `.xml` file resolves to
    /// [Compression::None]. Anything else is an error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let name = path.as_ref().to_string_lossy();

        Ok(match name {
            _ if name.ends_with(".gz") => Self::Gzip,
            _ if name.ends_with(".bz2") => Self::Bzip2,
            _ if name.ends_with(".xz") => Self::Xz,
            _ if name.ends_with(".zst") => Self::Zstd,
            _ if name.ends_with(".sqlite") || name.ends_with(".xml") => Self::None,
            _ => return Err(RpmRepoError::UnsupportedCompression(name.to_string())),
        })
    }
}

/// Wrap a reader with transparent decompression.
pub fn read_decompressed<'a>(
    stream: impl Read + 'a,
    compression: Compression,
) -> Result<Box<dyn Read + 'a>> {
    Ok(match compression {
        Compression::None => Box::new(stream),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(stream)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(stream)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(stream)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(stream)?),
    })
}

/// Decompress a SQLite database file into `dst`.
///
/// The compression format is detected from the source file name. The
/// decompressed stream must begin with the SQLite magic header; the
/// destination file is only created once the magic has been verified, and
/// is written through a temporary file so a partial database is never
/// observable at the final path.
pub fn unpack_sqlite(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<u64> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    let compression = Compression::from_path(src)?;

    let fh = std::fs::File::open(src)
        .map_err(|e| RpmRepoError::IoPath(src.display().to_string(), e))?;
    let mut reader = read_decompressed(std::io::BufReader::new(fh), compression)?;

    let mut magic = [0u8; 16];
    reader
        .read_exact(&mut magic)
        .map_err(|e| RpmRepoError::IoPath(src.display().to_string(), e))?;

    if &magic != SQLITE_MAGIC {
        return Err(RpmRepoError::NotSqlite(src.display().to_string()));
    }

    let dir = dst.parent().ok_or_else(|| {
        RpmRepoError::IoPath(
            dst.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no parent directory"),
        )
    })?;

    std::fs::create_dir_all(dir).map_err(|e| RpmRepoError::IoPath(dir.display().to_string(), e))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| RpmRepoError::IoPath(dir.display().to_string(), e))?;

    temp.write_all(&magic)
        .map_err(|e| RpmRepoError::IoPath(dst.display().to_string(), e))?;
    let copied = std::io::copy(&mut reader, &mut temp)
        .map_err(|e| RpmRepoError::IoPath(dst.display().to_string(), e))?;

    temp.persist(dst)
        .map_err(|e| RpmRepoError::IoPath(dst.display().to_string(), e.error))?;

    Ok(copied + magic.len() as u64)
}

/// Flavor of a content digest.
pub enum DigestFlavor {
    Sha1,
    Sha256,
}

/// Represents a content digest.
#[derive(Clone, Eq, PartialEq)]
pub enum ContentDigest {
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    /// Create a new SHA-1 instance by parsing a hex digest.
    pub fn sha1_hex(digest: &str) -> Result<Self> {
        Self::from_hex_digest(DigestFlavor::Sha1, digest)
    }

    /// Create a new SHA-256 instance by parsing a hex digest.
    pub fn sha256_hex(digest: &str) -> Result<Self> {
        Self::from_hex_digest(DigestFlavor::Sha256, digest)
    }

    /// Obtain an instance by parsing a hex string as a [DigestFlavor].
    pub fn from_hex_digest(flavor: DigestFlavor, digest: &str) -> Result<Self> {
        let digest = hex::decode(digest)?;

        Ok(match flavor {
            DigestFlavor::Sha1 => Self::Sha1(digest),
            DigestFlavor::Sha256 => Self::Sha256(digest),
        })
    }

    /// Create a new hasher matching the type of this digest.
    pub fn new_hasher(&self) -> Box<dyn digest::DynDigest + Send> {
        match self {
            Self::Sha1(_) => Box::new(sha1::Sha1::default()),
            Self::Sha256(_) => Box::new(sha2::Sha256::default()),
        }
    }

    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
        }
    }

    /// Obtain the hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }
}

/// Compute the hex encoded SHA-256 digest of a file, streaming.
pub fn file_sha256_hex(path: impl AsRef<Path>) -> Result<String> {
    use sha2::Digest;

    let path = path.as_ref();

    let mut fh = std::fs::File::open(path)
        .map_err(|e| RpmRepoError::IoPath(path.display().to_string(), e))?;

    let mut hasher = sha2::Sha256::new();
    std::io::copy(&mut fh, &mut hasher)
        .map_err(|e| RpmRepoError::IoPath(path.display().to_string(), e))?;

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Write};

    fn fake_sqlite_body() -> Vec<u8> {
        let mut data = SQLITE_MAGIC.to_vec();
        data.extend_from_slice(&[0x42u8; 512]);
        data
    }

    #[test]
    fn compression_from_path() -> Result<()> {
        assert_eq!(
            Compression::from_path("primary.sqlite.bz2")?,
            Compression::Bzip2
        );
        assert_eq!(
            Compression::from_path("filelists.sqlite.zst")?,
            Compression::Zstd
        );
        assert_eq!(Compression::from_path("other.sqlite")?, Compression::None);
        assert!(Compression::from_path("primary.sqlite.lz4").is_err());

        Ok(())
    }

    #[test]
    fn unpack_gzip_roundtrip() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let body = fake_sqlite_body();

        let src = dir.path().join("primary.sqlite.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&src)?,
            flate2::Compression::default(),
        );
        encoder.write_all(&body)?;
        encoder.finish()?;

        let dst = dir.path().join("primary.sqlite");
        let written = unpack_sqlite(&src, &dst)?;

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dst)?, body);

        Ok(())
    }

    #[test]
    fn unpack_rejects_non_sqlite() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let src = dir.path().join("bogus.sqlite.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&src)?,
            flate2::Compression::default(),
        );
        encoder.write_all(b"this is not a database, not even close")?;
        encoder.finish()?;

        let dst = dir.path().join("bogus.sqlite");
        assert!(matches!(
            unpack_sqlite(&src, &dst),
            Err(RpmRepoError::NotSqlite(_))
        ));
        assert!(!dst.exists());

        Ok(())
    }

    #[test]
    fn sha256_of_file() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("data");
        std::fs::write(&path, b"abc")?;

        assert_eq!(
            file_sha256_hex(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        Ok(())
    }
}
