//! Parsing of `git status --porcelain=v1 -b -z` output.

use serde::Serialize;

/// One entry of the porcelain status list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    /// Path relative to the repository root.
    pub path: String,
    /// Index status code (`X` column).
    pub index: char,
    /// Working-directory status code (`Y` column).
    pub working_dir: char,
}

impl FileStatus {
    /// Whether the index holds a change for this path.
    pub fn is_staged(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }

    /// Whether the path is untracked.
    pub fn is_untracked(&self) -> bool {
        self.index == '?' && self.working_dir == '?'
    }

    /// Whether this entry is `path` itself or lies underneath it.
    pub fn is_at_or_under(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        self.path == path
            || self
                .path
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Snapshot of a repository's working tree and index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitStatus {
    /// Current branch, `None` for a detached HEAD.
    pub current: Option<String>,
    /// Upstream tracking branch, if any.
    pub tracking: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub deleted: Vec<String>,
    /// Every entry with its raw status codes.
    pub files: Vec<FileStatus>,
}

impl GitStatus {
    /// True when nothing is staged, modified, deleted or untracked.
    pub fn is_clean(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries at or under `path`.
    pub fn entries_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FileStatus> + 'a {
        self.files.iter().filter(move |f| f.is_at_or_under(path))
    }

    /// Parse NUL-separated porcelain v1 output produced with `-b -z`.
    pub fn parse(raw: &str) -> Self {
        let mut status = GitStatus::default();
        let mut records = raw.split('\0').filter(|r| !r.is_empty());

        while let Some(record) = records.next() {
            if let Some(header) = record.strip_prefix("## ") {
                status.parse_branch_header(header);
                continue;
            }

            if record.len() < 4 {
                continue;
            }

            let mut codes = record.chars();
            let index = codes.next().unwrap_or(' ');
            let working_dir = codes.next().unwrap_or(' ');
            let path = record[3..].to_string();

            // Renames and copies carry the original path as the next record.
            if matches!(index, 'R' | 'C') {
                records.next();
            }

            let entry = FileStatus {
                path,
                index,
                working_dir,
            };

            if entry.is_untracked() {
                status.untracked.push(entry.path.clone());
            } else {
                if entry.is_staged() {
                    status.staged.push(entry.path.clone());
                }
                if working_dir == 'M' {
                    status.modified.push(entry.path.clone());
                }
                if index == 'D' || working_dir == 'D' {
                    status.deleted.push(entry.path.clone());
                }
            }

            status.files.push(entry);
        }

        status
    }

    fn parse_branch_header(&mut self, header: &str) {
        if let Some(branch) = header
            .strip_prefix("No commits yet on ")
            .or_else(|| header.strip_prefix("Initial commit on "))
        {
            self.current = Some(branch.trim().to_string());
            return;
        }

        if header.starts_with("HEAD (no branch)") {
            self.current = None;
            return;
        }

        let (refs, counts) = match header.split_once(" [") {
            Some((refs, counts)) => (refs, Some(counts.trim_end_matches(']'))),
            None => (header, None),
        };

        match refs.split_once("...") {
            Some((local, upstream)) => {
                self.current = Some(local.to_string());
                self.tracking = Some(upstream.to_string());
            }
            None => self.current = Some(refs.trim().to_string()),
        }

        for part in counts.into_iter().flat_map(|c| c.split(", ")) {
            if let Some(n) = part.strip_prefix("ahead ") {
                self.ahead = n.parse().unwrap_or(0);
            } else if let Some(n) = part.strip_prefix("behind ") {
                self.behind = n.parse().unwrap_or(0);
            }
        }
    }
}
