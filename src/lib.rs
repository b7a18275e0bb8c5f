// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM repository management engine.

This crate implements the engine behind a two-stage RPM repository: an
unstable *testing* stage packages are uploaded to, and a stable *release*
stage they are promoted into. The engine keeps the on-disk repodata
consistent with what is actually stored, signs packages with a PGP key,
and answers expressive queries against the repository without rebuilding
state from scratch.

# A Tour of Functionality

The [repository::Repository] type is the top-level object. It owns a
[storage::Storage] backend, the signing key and the mutation policies,
and hands out per-stage [subrepo::SubRepository] façades via
[repository::Repository::testing] and [repository::Repository::release].

Packages are modeled in the [package] module: [package::Package] is the
unit of distribution, packages sharing a source RPM group into a
[package::PackageBundle], and an ordered list of bundles (a
[package::PackageStack]) is the canonical result of list and search
operations. Architectures and architecture masks live in [arch].

Storage is a capability seam. [storage::Storage] defines the contract
(initialize, add, remove, copy, cache lifecycle, database access) and
[storage::local::LocalStorage] implements it for a local filesystem,
including the optional single-letter directory splitting and the
user/group/mode policy. Mutations are temp-then-rename so a partial file
is never observable at its final path.

Repository metadata is the de-facto YUM/DNF repodata format. The
[repodata] module parses `repomd.xml`; [io] streams the compressed
SQLite databases into a local decompressed cache (validating the SQLite
magic on the way); [db] decides when that cache is stale. The external
`createrepo_c` builder rewrites the metadata and is driven by
[createrepo::IndexBuilder].

Searching compiles a term-based query language ([query::Query]) into SQL
fragments over the primary and filelists databases, evaluated per
architecture and intersected into one result set. The [signing] module
loads armored PGP keys, generates key pairs, signs packages and verifies
signature issuers. [integrity::IntegrityChecker] audits cross-stage
consistency, checksums, permissions and signatures. Long-running
operations accept a [cancel::CancelToken].
*/

pub mod arch;
pub mod cancel;
pub mod createrepo;
pub mod db;
pub mod error;
pub mod integrity;
pub mod io;
pub mod package;
pub mod query;
pub mod repodata;
pub mod repository;
pub mod rpm_file;
pub mod signing;
pub mod storage;
pub mod subrepo;
pub mod version;

pub use crate::error::{Result, RpmRepoError};
