// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RpmRepoError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("SQLite error: {0:?}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("XML error: {0:?}")]
    Xml(#[from] serde_xml_rs::Error),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("RPM error: {0:?}")]
    Rpm(#[from] rpm::Error),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("unknown architecture: {0}")]
    UnknownArchitecture(String),

    #[error("no recognized architecture in file name: {0}")]
    NoArchitectureSuffix(String),

    #[error("{0} is not an RPM file")]
    NotRpm(String),

    #[error("{0} is not an SQLite database")]
    NotSqlite(String),

    #[error("unsupported compression for file: {0}")]
    UnsupportedCompression(String),

    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),

    #[error("invalid file filter pattern: {0}")]
    InvalidFileFilter(String),

    #[error("file does not match repository filter: {0}")]
    FileFilterRejected(String),

    #[error("package {0} already present in {1}")]
    PackageAlreadyPresent(String, &'static str),

    #[error("package file not found in {1}: {0}")]
    PackageFileNotFound(String, &'static str),

    #[error("storage is already initialized")]
    StorageAlreadyInitialized,

    #[error("repository has no storage for {0} in {1}")]
    NoDepot(&'static str, &'static str),

    #[error("cannot use noarch here: repository has no binary architecture")]
    NoarchWithoutBinaryArch,

    #[error("noarch is a pseudo-architecture and cannot be initialized")]
    NoarchPseudoArch,

    #[error("package file name must start with an ASCII letter or digit: {0}")]
    BadSplitLetter(String),

    #[error("unknown user or group: {0}")]
    UnknownOwner(String),

    #[error("permissions error on {0}: {1}")]
    Permissions(String, String),

    #[error("repository metadata entry not found: {0}")]
    MetadataFileNotFound(&'static str),

    #[error("unknown content digest format: {0}")]
    UnknownDigestFormat(String),

    #[error("metadata timestamp missing for {0}")]
    MetadataMissingTimestamp(&'static str),

    #[error("signing key is encrypted; passphrase required")]
    KeyIsEncrypted,

    #[error("wrong passphrase for signing key")]
    WrongPassphrase,

    #[error("signing key field must not be empty: {0}")]
    KeyFieldEmpty(&'static str),

    #[error("signing required but {0} is not signed with the configured key")]
    SigningRequired(String),

    #[error("createrepo_c binary not found")]
    CreaterepoNotFound,

    #[error("createrepo_c failed: {0}")]
    CreaterepoFailed(String),

    #[error("query parse error: {0}")]
    QueryParse(String),

    #[error("search requires at least one search term")]
    QueryOnlyFilterTerms,

    #[error("list filter must contain at least 3 symbols")]
    ListFilterTooShort,

    #[error("list filter contains illegal characters: {0}")]
    ListFilterIllegalChar(String),

    #[error("cleanup must keep at least 3 versions; got {0}")]
    CleanupKeepTooSmall(usize),

    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, RpmRepoError>;
