// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Driving the external `createrepo_c` index builder.

The builder rewrites `repodata/` for one depot directory. Its output is
expected to be atomic; the driver does not try to repair a failed run.
*/

use {
    crate::error::{Result, RpmRepoError},
    serde::{Deserialize, Serialize},
    std::{
        io::{BufRead, BufReader},
        path::Path,
        sync::mpsc,
    },
};

/// Options controlling how repodata indexes are built.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Checksum algorithm, e.g. `sha256`.
    pub checksum: Option<String>,
    /// Pretty-print the XML output.
    pub pretty: bool,
    /// Incremental update instead of a full rebuild.
    pub update: bool,
    /// Run in split media mode.
    pub split: bool,
    /// Ignore symlinked packages.
    pub skip_symlinks: bool,
    /// Number of changelog entries to keep per package.
    pub changelog_limit: Option<u32>,
    /// Use simple metadata file names instead of checksum-prefixed ones.
    pub simple_md_filenames: bool,
    /// Distribution tag.
    pub distro: Option<String>,
    /// Content tag.
    pub content: Option<String>,
    /// Revision string.
    pub revision: Option<String>,
    /// Generate delta RPMs.
    pub deltas: bool,
    /// Number of deltas per package.
    pub num_deltas: Option<u32>,
    /// Worker thread count.
    pub workers: Option<u32>,
    /// Compression for the metadata files, e.g. `bz2`, `xz`, `zstd`.
    pub compression: Option<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            checksum: None,
            pretty: true,
            update: true,
            split: false,
            skip_symlinks: false,
            changelog_limit: None,
            simple_md_filenames: true,
            distro: None,
            content: None,
            revision: None,
            deltas: false,
            num_deltas: None,
            workers: None,
            compression: None,
        }
    }
}

/// Invokes `createrepo_c` for depot directories.
#[derive(Clone, Debug)]
pub struct IndexBuilder {
    program: String,
    options: IndexOptions,
}

impl IndexBuilder {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            program: "createrepo_c".to_string(),
            options,
        }
    }

    /// Override the program to invoke. Used by tests.
    pub fn with_program(mut self, program: impl ToString) -> Self {
        self.program = program.to_string();
        self
    }

    /// Assemble the argument vector for one run.
    ///
    /// `full` forces a full rebuild even when the options ask for
    /// incremental updates.
    fn build_args(&self, data_dir: &Path, full: bool) -> Vec<String> {
        let options = &self.options;
        let mut args = vec!["--database".to_string()];

        if options.update && !full {
            args.push("--update".to_string());
        }

        if options.simple_md_filenames {
            args.push("--simple-md-filenames".to_string());
        } else {
            args.push("--unique-md-filenames".to_string());
        }

        if let Some(checksum) = &options.checksum {
            args.push(format!("--checksum={}", checksum));
        }

        if let Some(compression) = &options.compression {
            args.push(format!("--compress-type={}", compression));
        }

        if let Some(workers) = options.workers {
            args.push(format!("--workers={}", workers));
        }

        if let Some(distro) = &options.distro {
            args.push(format!("--distro={}", distro));
        }

        if let Some(content) = &options.content {
            args.push(format!("--content={}", content));
        }

        if let Some(revision) = &options.revision {
            args.push(format!("--revision={}", revision));
        }

        if let Some(limit) = options.changelog_limit {
            args.push(format!("--changelog-limit={}", limit));
        }

        if options.split {
            args.push("--split".to_string());
        }

        if options.skip_symlinks {
            args.push("--skip-symlinks".to_string());
        }

        if options.deltas {
            args.push("--deltas".to_string());

            if let Some(num) = options.num_deltas {
                args.push(format!("--num-deltas={}", num));
            }
        }

        if options.pretty {
            args.push("--pretty".to_string());
        }

        args.push(data_dir.display().to_string());

        args
    }

    /// Rebuild the repodata for one depot directory.
    ///
    /// Child stdout is streamed line by line onto `progress` when a
    /// channel is given.
    pub fn run(
        &self,
        data_dir: &Path,
        full: bool,
        progress: Option<&mpsc::Sender<String>>,
    ) -> Result<()> {
        let args = self.build_args(data_dir, full);

        log::info!("invoking {} with args: {:?}", self.program, args);

        let reader = duct::cmd(&self.program, &args)
            .stderr_to_stdout()
            .unchecked()
            .reader()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RpmRepoError::CreaterepoNotFound
                } else {
                    RpmRepoError::Io(e)
                }
            })?;

        let mut tail = Vec::new();
        {
            let buffered = BufReader::new(&reader);
            for line in buffered.lines() {
                let line = line?;

                log::debug!("{}: {}", self.program, line);

                if tail.len() >= 20 {
                    tail.remove(0);
                }
                tail.push(line.clone());

                if let Some(progress) = progress {
                    // A closed receiver only means nobody is watching.
                    let _ = progress.send(line);
                }
            }
        }

        let output = reader.try_wait()?.ok_or_else(|| {
            RpmRepoError::CreaterepoFailed("unable to wait on child".to_string())
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RpmRepoError::CreaterepoFailed(tail.join("\n")))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn args_reflect_options() {
        let options = IndexOptions {
            checksum: Some("sha256".to_string()),
            compression: Some("zstd".to_string()),
            workers: Some(4),
            changelog_limit: Some(10),
            skip_symlinks: true,
            ..Default::default()
        };

        let builder = IndexBuilder::new(options);
        let args = builder.build_args(Path::new("/data/repo/testing/x86_64"), false);

        assert!(args.contains(&"--database".to_string()));
        assert!(args.contains(&"--update".to_string()));
        assert!(args.contains(&"--simple-md-filenames".to_string()));
        assert!(args.contains(&"--checksum=sha256".to_string()));
        assert!(args.contains(&"--compress-type=zstd".to_string()));
        assert!(args.contains(&"--workers=4".to_string()));
        assert!(args.contains(&"--changelog-limit=10".to_string()));
        assert!(args.contains(&"--skip-symlinks".to_string()));
        assert!(args.contains(&"--pretty".to_string()));
        assert_eq!(args.last().unwrap(), "/data/repo/testing/x86_64");
    }

    #[test]
    fn full_rebuild_disables_update() {
        let builder = IndexBuilder::new(IndexOptions::default());
        let args = builder.build_args(Path::new("/data"), true);

        assert!(!args.contains(&"--update".to_string()));
    }

    #[test]
    fn missing_binary_is_reported() {
        let builder =
            IndexBuilder::new(IndexOptions::default()).with_program("createrepo-c-definitely-absent");

        assert!(matches!(
            builder.run(Path::new("/tmp"), false, None),
            Err(RpmRepoError::CreaterepoNotFound)
        ));
    }

    #[test]
    fn streams_progress_lines() -> Result<()> {
        // `echo` stands in for the real builder: arguments come back on
        // stdout, which exercises the streaming path.
        let builder = IndexBuilder::new(IndexOptions::default()).with_program("echo");

        let (tx, rx) = mpsc::channel();
        builder.run(Path::new("/tmp"), false, Some(&tx))?;
        drop(tx);

        let lines = rx.into_iter().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("--database"));

        Ok(())
    }
}
