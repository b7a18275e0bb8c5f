// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Search query language.

A query is a sequence of whitespace-separated terms. Each term has a
prefix (short or long form), an operator (`:` selects, `::` excludes) and
a value:

```text
n:nginx v::1.19.6 R:mylib>=1.16 S:10mb+ d:30
```

Terms compile to SQL fragments over the repodata databases. Every
fragment selects `pkgKey` values; the caller intersects (or subtracts)
the sets per architecture. Filter terms (`released:yes`) produce no SQL
and are applied after hydration.
*/

use {
    crate::{
        arch::Arch,
        db::DbType,
        error::{Result, RpmRepoError},
    },
    std::fmt::Write as _,
};

/// How a term combines with the running candidate set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TermOp {
    /// `:`, intersect.
    Include,
    /// `::`, subtract.
    Exclude,
}

/// Version comparison operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl VerOp {
    fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Split a leading operator off a value.
    fn strip(value: &str) -> (Option<VerOp>, &str) {
        for (token, op) in [
            ("<=", VerOp::Le),
            (">=", VerOp::Ge),
            ("<", VerOp::Lt),
            (">", VerOp::Gt),
            ("=", VerOp::Eq),
        ] {
            if let Some(rest) = value.strip_prefix(token) {
                return (Some(op), rest);
            }
        }

        (None, value)
    }
}

/// A version match: an operator plus one or more alternatives.
///
/// Alternatives (`1.0|1.1|2.0`) are only meaningful for equality.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionMatch {
    pub op: VerOp,
    pub versions: Vec<String>,
}

/// A dependency match: `name[op version[-release]]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DepMatch {
    pub name: String,
    pub op: Option<VerOp>,
    pub version: Option<String>,
    pub release: Option<String>,
}

/// A size match in bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SizeMatch {
    /// Within ±2% of the given size.
    Near(u64),
    /// At least the given size.
    Min(u64),
    /// At most the given size.
    Max(u64),
    /// Inside a closed range.
    Range(u64, u64),
}

/// The dependency tables of the primary database.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DepTable {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
    Recommends,
    Enhances,
    Suggests,
    Supplements,
}

impl DepTable {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Provides => "provides",
            Self::Requires => "requires",
            Self::Conflicts => "conflicts",
            Self::Obsoletes => "obsoletes",
            Self::Recommends => "recommends",
            Self::Enhances => "enhances",
            Self::Suggests => "suggests",
            Self::Supplements => "supplements",
        }
    }
}

/// What a term matches on.
#[derive(Clone, Debug, PartialEq)]
pub enum TermKind {
    Name(String),
    Version(VersionMatch),
    Release(String),
    Epoch(u64),
    Arch(Arch),
    Source(String),
    License(String),
    Group(String),
    Vendor(String),
    Dependency(DepTable, DepMatch),
    /// Added to the repository within the given number of seconds.
    DateAdd(i64),
    /// Built within the given number of seconds.
    DateBuild(i64),
    Size(SizeMatch),
    /// Config/bin/exec payload entries.
    File(String),
    /// Any payload entry.
    Payload(String),
    /// Post-hydration filter: package is (not) released.
    Released(bool),
}

impl TermKind {
    /// Filter terms produce no SQL; they apply to hydrated rows.
    pub fn is_filter(&self) -> bool {
        matches!(self, Self::Released(_))
    }
}

/// One parsed query term.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub op: TermOp,
    pub kind: TermKind,
}

/// A parsed query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub terms: Vec<Term>,
}

impl Query {
    /// Parse a query string.
    ///
    /// At least one non-filter term is required.
    pub fn parse(input: &str) -> Result<Self> {
        let mut terms = vec![];

        for token in input.split_whitespace() {
            terms.push(parse_term(token)?);
        }

        if terms.is_empty() || terms.iter().all(|t| t.kind.is_filter()) {
            return Err(RpmRepoError::QueryOnlyFilterTerms);
        }

        Ok(Self { terms })
    }

    /// The released-state filter, when the query carries one.
    ///
    /// `released::yes` is normalized to the same meaning as
    /// `released:no`.
    pub fn released_filter(&self) -> Option<bool> {
        self.terms.iter().find_map(|t| match t.kind {
            TermKind::Released(wanted) => Some(match t.op {
                TermOp::Include => wanted,
                TermOp::Exclude => !wanted,
            }),
            _ => None,
        })
    }
}

fn parse_term(token: &str) -> Result<Term> {
    let colon = token
        .find(':')
        .ok_or_else(|| RpmRepoError::QueryParse(format!("term has no value: {}", token)))?;

    let prefix = &token[..colon];
    let (op, value) = if token[colon..].starts_with("::") {
        (TermOp::Exclude, &token[colon + 2..])
    } else {
        (TermOp::Include, &token[colon + 1..])
    };

    if value.is_empty() {
        return Err(RpmRepoError::QueryParse(format!(
            "term has an empty value: {}",
            token
        )));
    }

    // Shell quoting is not always stripped by the caller.
    let value = value.trim_matches(|c| c == '\'' || c == '"');

    let kind = match prefix {
        "n" | "name" => TermKind::Name(value.to_string()),
        "v" | "version" => TermKind::Version(parse_version_match(value)?),
        "r" | "release" => TermKind::Release(value.to_string()),
        "e" | "epoch" => TermKind::Epoch(value.parse().map_err(|_| {
            RpmRepoError::QueryParse(format!("epoch must be a non-negative integer: {}", value))
        })?),
        "a" | "arch" => TermKind::Arch(Arch::from_name(value)?),
        "s" | "source" => TermKind::Source(value.to_string()),
        "l" | "license" => TermKind::License(value.to_string()),
        "g" | "group" => TermKind::Group(value.to_string()),
        "V" | "vendor" => TermKind::Vendor(value.to_string()),
        "P" | "provides" => TermKind::Dependency(DepTable::Provides, parse_dep_match(value)?),
        "R" | "requires" => TermKind::Dependency(DepTable::Requires, parse_dep_match(value)?),
        "C" | "conflicts" => TermKind::Dependency(DepTable::Conflicts, parse_dep_match(value)?),
        "O" | "obsoletes" => TermKind::Dependency(DepTable::Obsoletes, parse_dep_match(value)?),
        "rec" | "recommends" => {
            TermKind::Dependency(DepTable::Recommends, parse_dep_match(value)?)
        }
        "enh" | "enhances" => TermKind::Dependency(DepTable::Enhances, parse_dep_match(value)?),
        "sug" | "suggests" => TermKind::Dependency(DepTable::Suggests, parse_dep_match(value)?),
        "sup" | "supplements" => {
            TermKind::Dependency(DepTable::Supplements, parse_dep_match(value)?)
        }
        "d" | "date-add" => TermKind::DateAdd(parse_duration(value)?),
        "D" | "date-build" => TermKind::DateBuild(parse_duration(value)?),
        "S" | "size" => TermKind::Size(parse_size_match(value)?),
        "f" | "file" => TermKind::File(value.to_string()),
        "@" | "payload" => TermKind::Payload(value.to_string()),
        "^" | "released" => TermKind::Released(match value {
            "yes" | "y" | "true" | "1" => true,
            "no" | "n" | "false" | "0" => false,
            _ => {
                return Err(RpmRepoError::QueryParse(format!(
                    "released takes yes or no: {}",
                    value
                )))
            }
        }),
        _ => {
            return Err(RpmRepoError::QueryParse(format!(
                "unknown term prefix: {}",
                prefix
            )))
        }
    };

    Ok(Term { op, kind })
}

fn parse_version_match(value: &str) -> Result<VersionMatch> {
    let (op, rest) = VerOp::strip(value);
    let op = op.unwrap_or(VerOp::Eq);

    let versions = rest
        .split('|')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>();

    if versions.is_empty() {
        return Err(RpmRepoError::QueryParse(format!(
            "version term has no version: {}",
            value
        )));
    }

    if versions.len() > 1 && op != VerOp::Eq {
        return Err(RpmRepoError::QueryParse(format!(
            "version alternatives only combine with equality: {}",
            value
        )));
    }

    Ok(VersionMatch { op, versions })
}

fn parse_dep_match(value: &str) -> Result<DepMatch> {
    let op_start = value.find(|c| c == '<' || c == '>' || c == '=');

    let Some(op_start) = op_start else {
        return Ok(DepMatch {
            name: value.to_string(),
            op: None,
            version: None,
            release: None,
        });
    };

    let name = value[..op_start].trim().to_string();
    if name.is_empty() {
        return Err(RpmRepoError::QueryParse(format!(
            "dependency has no name: {}",
            value
        )));
    }

    let (op, version) = VerOp::strip(value[op_start..].trim_start());
    let op = op.ok_or_else(|| {
        RpmRepoError::QueryParse(format!("bad dependency operator: {}", value))
    })?;

    let version = version.trim();
    if version.is_empty() {
        return Err(RpmRepoError::QueryParse(format!(
            "dependency has an operator but no version: {}",
            value
        )));
    }

    let (version, release) = match version.split_once('-') {
        Some((v, r)) => (v.to_string(), Some(r.to_string())),
        None => (version.to_string(), None),
    };

    Ok(DepMatch {
        name,
        op: Some(op),
        version: Some(version),
        release,
    })
}

/// Parse a duration like `2w`, `3d12h`, `90m` or a bare number of days.
/// Returns seconds.
fn parse_duration(value: &str) -> Result<i64> {
    if let Ok(days) = value.parse::<i64>() {
        if days < 0 {
            return Err(RpmRepoError::QueryParse(format!(
                "negative duration: {}",
                value
            )));
        }
        return Ok(days * 86_400);
    }

    let mut total = 0i64;
    let mut digits = String::new();

    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let unit = match c {
            'w' => 7 * 86_400,
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => {
                return Err(RpmRepoError::QueryParse(format!(
                    "bad duration unit {:?} in {}",
                    c, value
                )))
            }
        };

        if digits.is_empty() {
            return Err(RpmRepoError::QueryParse(format!(
                "duration unit without a number: {}",
                value
            )));
        }

        total += digits.parse::<i64>()? * unit;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(RpmRepoError::QueryParse(format!(
            "trailing number without a unit: {}",
            value
        )));
    }

    Ok(total)
}

fn parse_size_bytes(value: &str) -> Result<u64> {
    let value = value.trim();

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => value.split_at(pos),
        None => (value, ""),
    };

    let number = digits.parse::<u64>().map_err(|_| {
        RpmRepoError::QueryParse(format!("bad size value: {}", value))
    })?;

    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        _ => {
            return Err(RpmRepoError::QueryParse(format!(
                "bad size unit: {}",
                value
            )))
        }
    };

    Ok(number * multiplier)
}

fn parse_size_match(value: &str) -> Result<SizeMatch> {
    if let Some(rest) = value.strip_suffix('+') {
        return Ok(SizeMatch::Min(parse_size_bytes(rest)?));
    }

    if let Some((low, high)) = value.split_once('-') {
        if high.is_empty() {
            return Ok(SizeMatch::Max(parse_size_bytes(low)?));
        }

        let low = parse_size_bytes(low)?;
        let high = parse_size_bytes(high)?;

        if low > high {
            return Err(RpmRepoError::QueryParse(format!(
                "size range is inverted: {}",
                value
            )));
        }

        return Ok(SizeMatch::Range(low, high));
    }

    Ok(SizeMatch::Near(parse_size_bytes(value)?))
}

/// Quote a string literal for embedding in SQL.
fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Translate a user value into a SQL LIKE fragment: `*` becomes `%`,
/// `?` becomes `_`, and LIKE metacharacters are escaped.
fn like_fragment(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' | '_' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('%'),
            '?' => pattern.push('_'),
            c => pattern.push(c),
        }
    }

    pattern
}

/// Like [like_fragment], but `None` when the value has no wildcards and
/// plain equality should be used instead.
fn like_pattern(value: &str) -> Option<String> {
    if !value.contains('*') && !value.contains('?') {
        return None;
    }

    Some(like_fragment(value))
}

/// Emit `column = 'value'` or a LIKE clause when the value has wildcards.
fn string_predicate(column: &str, value: &str) -> String {
    match like_pattern(value) {
        Some(pattern) => format!("{} LIKE {} ESCAPE '\\'", column, sql_quote(&pattern)),
        None => format!("{} = {}", column, sql_quote(value)),
    }
}

/// Emit a `(version, release)` tuple comparison against a fixed value.
fn version_tuple_predicate(op: VerOp, version: &str, release: Option<&str>) -> String {
    let v = sql_quote(version);

    match (op, release) {
        (VerOp::Eq, None) => format!("version = {}", v),
        (VerOp::Eq, Some(r)) => format!("version = {} AND release = {}", v, sql_quote(r)),
        (op, None) => format!("version {} {}", op.sql(), v),
        (op, Some(r)) => {
            let r = sql_quote(r);
            let strict = match op {
                VerOp::Lt | VerOp::Le => "<",
                _ => ">",
            };
            format!(
                "(version {} {} OR (version = {} AND release {} {}))",
                strict,
                v,
                v,
                op.sql(),
                r
            )
        }
    }
}

/// Directories consulted by the `file` term.
const FILE_TERM_DIRS: &[&str] = &["/bin", "/sbin", "/usr/bin", "/usr/sbin", "/usr/libexec"];

fn filelist_predicate(value: &str, restrict: bool) -> String {
    let mut sql = String::new();

    match value.rsplit_once('/') {
        Some((dir, base)) if !dir.is_empty() => {
            let _ = write!(sql, "{} AND ", string_predicate("dirname", dir));
            let _ = write!(
                sql,
                "('/' || filenames || '/') LIKE {} ESCAPE '\\'",
                sql_quote(&format!("%/{}/%", like_fragment(base)))
            );
        }
        _ => {
            let base = value.trim_start_matches('/');
            let _ = write!(
                sql,
                "('/' || filenames || '/') LIKE {} ESCAPE '\\'",
                sql_quote(&format!("%/{}/%", like_fragment(base)))
            );
        }
    }

    if restrict {
        let dirs = FILE_TERM_DIRS
            .iter()
            .map(|d| sql_quote(d))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(
            sql,
            " AND (dirname IN ({}) OR dirname = '/etc' OR dirname LIKE '/etc/%')",
            dirs
        );
    }

    sql
}

impl Term {
    /// Compile the term into SQL fragments.
    ///
    /// Every fragment selects candidate `pkgKey` values in the returned
    /// database. `now` anchors the relative date terms. Filter terms
    /// return `None`.
    pub fn sql(&self, now: i64) -> Option<(DbType, Vec<String>)> {
        let primary = |clause: String| {
            Some((
                DbType::Primary,
                vec![format!("SELECT pkgKey FROM packages WHERE {}", clause)],
            ))
        };

        match &self.kind {
            TermKind::Name(value) => primary(string_predicate("name", value)),
            TermKind::Release(value) => primary(string_predicate("release", value)),
            TermKind::Epoch(value) => primary(format!("epoch = {}", sql_quote(&value.to_string()))),
            TermKind::Arch(arch) => primary(format!("arch = {}", sql_quote(arch.name()))),
            TermKind::Source(value) => primary(string_predicate("rpm_sourcerpm", value)),
            TermKind::License(value) => primary(string_predicate("rpm_license", value)),
            TermKind::Group(value) => primary(string_predicate("rpm_group", value)),
            TermKind::Vendor(value) => primary(string_predicate("rpm_vendor", value)),
            TermKind::Version(m) => {
                if m.op == VerOp::Eq {
                    let list = m
                        .versions
                        .iter()
                        .map(|v| sql_quote(v))
                        .collect::<Vec<_>>()
                        .join(", ");
                    primary(format!("version IN ({})", list))
                } else {
                    primary(format!("version {} {}", m.op.sql(), sql_quote(&m.versions[0])))
                }
            }
            TermKind::Dependency(table, m) => {
                let mut dep_clause = format!("name = {}", sql_quote(&m.name));

                if let (Some(op), Some(version)) = (m.op, &m.version) {
                    let _ = write!(
                        dep_clause,
                        " AND version IS NOT NULL AND {}",
                        version_tuple_predicate(op, version, m.release.as_deref())
                    );
                }

                Some((
                    DbType::Primary,
                    vec![
                        format!(
                            "SELECT pkgKey FROM {} WHERE {}",
                            table.table(),
                            dep_clause
                        ),
                        // A package whose own name matches satisfies the
                        // dependency implicitly.
                        format!(
                            "SELECT pkgKey FROM packages WHERE name = {}",
                            sql_quote(&m.name)
                        ),
                    ],
                ))
            }
            TermKind::DateAdd(seconds) => {
                primary(format!("time_file >= {}", now - seconds))
            }
            TermKind::DateBuild(seconds) => {
                primary(format!("time_build >= {}", now - seconds))
            }
            TermKind::Size(m) => {
                let clause = match m {
                    SizeMatch::Near(size) => {
                        let low = *size - *size / 50;
                        let high = *size + *size / 50;
                        format!("size_package BETWEEN {} AND {}", low, high)
                    }
                    SizeMatch::Min(size) => format!("size_package >= {}", size),
                    SizeMatch::Max(size) => format!("size_package <= {}", size),
                    SizeMatch::Range(low, high) => {
                        format!("size_package BETWEEN {} AND {}", low, high)
                    }
                };
                primary(clause)
            }
            TermKind::File(value) => Some((
                DbType::Filelists,
                vec![format!(
                    "SELECT pkgKey FROM filelist WHERE {}",
                    filelist_predicate(value, true)
                )],
            )),
            TermKind::Payload(value) => Some((
                DbType::Filelists,
                vec![format!(
                    "SELECT pkgKey FROM filelist WHERE {}",
                    filelist_predicate(value, false)
                )],
            )),
            TermKind::Released(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn parse_simple_terms() -> Result<()> {
        let query = Query::parse("n:nginx v::1.19.6")?;

        assert_eq!(query.terms.len(), 2);
        assert_eq!(query.terms[0].op, TermOp::Include);
        assert_eq!(query.terms[0].kind, TermKind::Name("nginx".to_string()));
        assert_eq!(query.terms[1].op, TermOp::Exclude);
        assert_eq!(
            query.terms[1].kind,
            TermKind::Version(VersionMatch {
                op: VerOp::Eq,
                versions: vec!["1.19.6".to_string()],
            })
        );

        Ok(())
    }

    #[test]
    fn parse_long_prefixes() -> Result<()> {
        let query = Query::parse("name:nginx vendor:Example released:yes")?;

        assert!(matches!(query.terms[0].kind, TermKind::Name(_)));
        assert!(matches!(query.terms[1].kind, TermKind::Vendor(_)));
        assert_eq!(query.released_filter(), Some(true));

        Ok(())
    }

    #[test]
    fn pure_filter_query_rejected() {
        assert!(matches!(
            Query::parse("released:yes"),
            Err(RpmRepoError::QueryOnlyFilterTerms)
        ));
        assert!(matches!(
            Query::parse(""),
            Err(RpmRepoError::QueryOnlyFilterTerms)
        ));
    }

    #[test]
    fn unknown_prefix_rejected() {
        assert!(Query::parse("zz:nope").is_err());
    }

    #[test]
    fn parse_dependency_values() -> Result<()> {
        let query = Query::parse("R:mylib>=1.16")?;

        assert_eq!(
            query.terms[0].kind,
            TermKind::Dependency(
                DepTable::Requires,
                DepMatch {
                    name: "mylib".to_string(),
                    op: Some(VerOp::Ge),
                    version: Some("1.16".to_string()),
                    release: None,
                }
            )
        );

        let query = Query::parse("P:'webserver=2.0-1.el7'")?;
        assert_eq!(
            query.terms[0].kind,
            TermKind::Dependency(
                DepTable::Provides,
                DepMatch {
                    name: "webserver".to_string(),
                    op: Some(VerOp::Eq),
                    version: Some("2.0".to_string()),
                    release: Some("1.el7".to_string()),
                }
            )
        );

        Ok(())
    }

    #[test]
    fn parse_durations() -> Result<()> {
        assert_eq!(parse_duration("3")?, 3 * 86_400);
        assert_eq!(parse_duration("2w")?, 14 * 86_400);
        assert_eq!(parse_duration("1d12h")?, 36 * 3_600);
        assert_eq!(parse_duration("90m")?, 5_400);
        assert!(parse_duration("12x").is_err());

        Ok(())
    }

    #[test]
    fn parse_sizes() -> Result<()> {
        assert_eq!(parse_size_match("10mb")?, SizeMatch::Near(10 * 1024 * 1024));
        assert_eq!(parse_size_match("10mb+")?, SizeMatch::Min(10 * 1024 * 1024));
        assert_eq!(parse_size_match("10mb-")?, SizeMatch::Max(10 * 1024 * 1024));
        assert_eq!(
            parse_size_match("10mb-20mb")?,
            SizeMatch::Range(10 * 1024 * 1024, 20 * 1024 * 1024)
        );
        assert!(parse_size_match("20mb-10mb").is_err());
        assert!(parse_size_match("10xb").is_err());

        Ok(())
    }

    #[test]
    fn version_alternatives() -> Result<()> {
        let m = parse_version_match("1.0|1.1|2.0")?;
        assert_eq!(m.versions.len(), 3);

        assert!(parse_version_match(">=1.0|1.1").is_err());

        Ok(())
    }

    #[test]
    fn name_term_sql() -> Result<()> {
        let query = Query::parse("n:nginx")?;
        let (db, fragments) = query.terms[0].sql(NOW).unwrap();

        assert_eq!(db, DbType::Primary);
        assert_eq!(
            fragments,
            vec!["SELECT pkgKey FROM packages WHERE name = 'nginx'"]
        );

        let query = Query::parse("n:ngin*")?;
        let (_, fragments) = query.terms[0].sql(NOW).unwrap();
        assert_eq!(
            fragments,
            vec!["SELECT pkgKey FROM packages WHERE name LIKE 'ngin%' ESCAPE '\\'"]
        );

        Ok(())
    }

    #[test]
    fn dependency_term_emits_two_fragments() -> Result<()> {
        let query = Query::parse("R:mylib>=1.16")?;
        let (db, fragments) = query.terms[0].sql(NOW).unwrap();

        assert_eq!(db, DbType::Primary);
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].contains("FROM requires"));
        assert!(fragments[0].contains("version >= '1.16'"));
        assert!(fragments[1].contains("FROM packages"));

        Ok(())
    }

    #[test]
    fn date_term_is_relative_to_now() -> Result<()> {
        let query = Query::parse("d:1")?;
        let (_, fragments) = query.terms[0].sql(NOW).unwrap();

        assert_eq!(
            fragments,
            vec![format!(
                "SELECT pkgKey FROM packages WHERE time_file >= {}",
                NOW - 86_400
            )]
        );

        Ok(())
    }

    #[test]
    fn filelists_terms_use_filelists_db() -> Result<()> {
        let query = Query::parse("f:/usr/bin/nginx @:nginx.conf")?;

        let (db, fragments) = query.terms[0].sql(NOW).unwrap();
        assert_eq!(db, DbType::Filelists);
        assert!(fragments[0].contains("dirname = '/usr/bin'"));
        assert!(fragments[0].contains("'%/nginx/%'"));
        assert!(fragments[0].contains("/usr/libexec"));

        let (db, fragments) = query.terms[1].sql(NOW).unwrap();
        assert_eq!(db, DbType::Filelists);
        assert!(!fragments[0].contains("/usr/libexec"));

        Ok(())
    }

    #[test]
    fn filter_terms_have_no_sql() -> Result<()> {
        let query = Query::parse("n:nginx ^:yes")?;

        assert!(query.terms[1].sql(NOW).is_none());
        assert_eq!(query.released_filter(), Some(true));

        Ok(())
    }

    #[test]
    fn sql_quoting() {
        assert_eq!(sql_quote("it's"), "'it''s'");
        assert_eq!(
            string_predicate("name", "odd'name"),
            "name = 'odd''name'"
        );
    }
}
