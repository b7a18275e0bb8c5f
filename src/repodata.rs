// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `repomd.xml` file format.

`repomd.xml` is the index descriptor inside a `repodata/` directory. It
lists the other metadata files constituting the repository, with their
checksums, sizes and timestamps. The file is produced by the external
index builder and treated as authoritative; this parser tolerates data
sections it does not know about.
*/

use {
    crate::{
        error::{Result, RpmRepoError},
        io::ContentDigest,
    },
    serde::{Deserialize, Serialize},
    std::{io::Read, path::Path},
};

/// A parsed `repomd.xml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMd {
    /// Revision of the repository. Often an integer-like value.
    pub revision: String,
    /// The data sections describing the metadata files.
    pub data: Vec<RepoMdData>,
}

impl RepoMd {
    /// Construct an instance by parsing XML from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    /// Construct an instance by parsing XML from a string.
    pub fn from_xml(s: &str) -> Result<Self> {
        Ok(serde_xml_rs::from_str(s)?)
    }

    /// Construct an instance by reading a `repomd.xml` file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path)
            .map_err(|e| RpmRepoError::IoPath(path.display().to_string(), e))?;

        Self::from_reader(std::io::BufReader::new(fh))
    }

    /// Find the data section of the given type, e.g. `primary_db`.
    pub fn get(&self, data_type: &str) -> Option<&RepoMdData> {
        self.data.iter().find(|d| d.data_type == data_type)
    }
}

/// A `<data>` element in a `repomd.xml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RepoMdData {
    /// The type of data.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Content checksum of this file.
    pub checksum: Checksum,
    /// Where the file is located, relative to the repository root.
    pub location: Location,
    /// Size in bytes of the file as stored in the repository.
    pub size: Option<u64>,
    /// Time the file was created or modified.
    pub timestamp: Option<i64>,
    /// Content checksum of the decoded (decompressed) file.
    #[serde(rename = "open-checksum")]
    pub open_checksum: Option<Checksum>,
    /// Size in bytes of the decoded (decompressed) file.
    #[serde(rename = "open-size")]
    pub open_size: Option<u64>,
    /// Schema version of a database file.
    pub database_version: Option<u64>,
}

impl RepoMdData {
    /// The timestamp recorded for this section.
    ///
    /// Missing timestamps are an error because the cache freshness rules
    /// use them as ground truth.
    pub fn required_timestamp(&self, data_type: &'static str) -> Result<i64> {
        self.timestamp
            .ok_or(RpmRepoError::MetadataMissingTimestamp(data_type))
    }
}

/// The content checksum of a `<data>` element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Checksum {
    /// The name of the content digest.
    #[serde(rename = "type")]
    pub name: String,
    /// The hex encoded content digest.
    #[serde(rename = "$value")]
    pub value: String,
}

impl TryFrom<Checksum> for ContentDigest {
    type Error = RpmRepoError;

    fn try_from(v: Checksum) -> std::result::Result<Self, Self::Error> {
        match v.name.as_str() {
            "sha1" => ContentDigest::sha1_hex(&v.value),
            "sha256" => ContentDigest::sha256_hex(&v.value),
            name => Err(RpmRepoError::UnknownDigestFormat(name.to_string())),
        }
    }
}

/// The location of a `<data>` element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Location {
    pub href: String,
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    const REPOMD_XML: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
          <revision>1633024062</revision>
          <data type="primary">
            <checksum type="sha256">5dc1e6e73c84803f059bb3065e684e56adfc289a7e398946574d79dee5eb612f</checksum>
            <open-checksum type="sha256">d1e0891ed5fa6a3e29135fd36e1961a895eb6c0c5ad504af4ba2cf0a4b8df1f6</open-checksum>
            <location href="repodata/5dc1e6e7-primary.xml.gz"/>
            <timestamp>1633024062</timestamp>
            <size>2932</size>
            <open-size>16256</open-size>
          </data>
          <data type="primary_db">
            <checksum type="sha256">aa5856dcadb5f537c0f390e7ed51ed92b876fa6b7d036ad63beef135e1a5be1c</checksum>
            <location href="repodata/aa5856dc-primary.sqlite.bz2"/>
            <timestamp>1633024063</timestamp>
            <size>7412</size>
            <database_version>10</database_version>
          </data>
          <data type="filelists_db">
            <checksum type="sha256">58ee428e10dff2c4494da74cf66b0054b180b956953b40a2364978d9495073dc</checksum>
            <location href="repodata/58ee428e-filelists.sqlite.bz2"/>
            <timestamp>1633024063</timestamp>
            <size>1239</size>
          </data>
          <data type="other_db">
            <checksum type="sha256">6b2e4e3e5a0e1a6bcf2b64ad2b2865cd1cfd9f2bd3173a0fd2a29f8bc7ba6225</checksum>
            <location href="repodata/6b2e4e3e-other.sqlite.bz2"/>
            <timestamp>1633024063</timestamp>
            <size>931</size>
          </data>
          <data type="unknown_future_section">
            <checksum type="sha256">00000000000000000000000000000000000000000000000000000000deadbeef</checksum>
            <location href="repodata/whatever.bin"/>
            <timestamp>1633024064</timestamp>
          </data>
        </repomd>
    "#};

    #[test]
    fn parse() -> Result<()> {
        let repomd = RepoMd::from_xml(REPOMD_XML)?;

        assert_eq!(repomd.revision, "1633024062");
        assert_eq!(repomd.data.len(), 5);

        let primary_db = repomd.get("primary_db").unwrap();
        assert_eq!(
            primary_db.location.href,
            "repodata/aa5856dc-primary.sqlite.bz2"
        );
        assert_eq!(primary_db.timestamp, Some(1633024063));
        assert_eq!(primary_db.database_version, Some(10));

        assert!(repomd.get("group").is_none());

        Ok(())
    }

    #[test]
    fn unknown_sections_tolerated() -> Result<()> {
        let repomd = RepoMd::from_xml(REPOMD_XML)?;

        assert!(repomd.get("unknown_future_section").is_some());

        Ok(())
    }
}
