//! Root enumeration for git-format repositories.
//!
//! Every branch under `refs/heads` expands to its full commit history; every
//! tag under `refs/tags` contributes its peeled target. Loose refs win over
//! `packed-refs` entries of the same name.

use crate::error::StatsError;
use crate::source::git::{parse_parents, parse_tag};
use crate::source::repo::RepoObjectSource;
use crate::source::{RootProvider, RootSet};
use crate::types::{ObjectHash, ObjectKind};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";
/// Upper bound on nested annotated tags.
const MAX_TAG_DEPTH: usize = 16;

pub struct RepoRootProvider<'a> {
    git_dir: PathBuf,
    objects: &'a RepoObjectSource,
}

impl<'a> RepoRootProvider<'a> {
    pub fn new(git_dir: &Path, objects: &'a RepoObjectSource) -> Self {
        Self {
            git_dir: git_dir.to_path_buf(),
            objects,
        }
    }

    /// All refs as `refname -> hash`, sorted by name.
    pub fn list_refs(&self) -> Result<BTreeMap<String, ObjectHash>, StatsError> {
        let mut refs = BTreeMap::new();

        let packed = self.git_dir.join("packed-refs");
        if packed.is_file() {
            for line in std::fs::read_to_string(&packed)?.lines() {
                if line.starts_with('#') || line.starts_with('^') || line.trim().is_empty() {
                    continue;
                }
                if let Some((hash, name)) = line.split_once(' ') {
                    match ObjectHash::parse(hash) {
                        Ok(hash) => {
                            refs.insert(name.trim().to_string(), hash);
                        }
                        Err(e) => warn!(line, error = %e, "Skipping packed ref"),
                    }
                }
            }
        }

        let refs_dir = self.git_dir.join("refs");
        if refs_dir.is_dir() {
            for entry in WalkDir::new(&refs_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    StatsError::Repository(format!("failed to walk {}: {}", refs_dir.display(), e))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&self.git_dir) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                let content = std::fs::read_to_string(entry.path())?;
                let content = content.trim();
                if content.starts_with("ref:") {
                    debug!(refname = %name, "Skipping symbolic ref");
                    continue;
                }
                match ObjectHash::parse(content) {
                    Ok(hash) => {
                        refs.insert(name, hash);
                    }
                    Err(e) => warn!(refname = %name, error = %e, "Skipping unreadable ref"),
                }
            }
        }

        Ok(refs)
    }

    /// Commits reachable from `head` through parent links, newest first, each once.
    ///
    /// Commits that cannot be read end that line of history with a warning.
    pub fn history(&self, head: &ObjectHash) -> Vec<ObjectHash> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([head.clone()]);
        let mut commits = Vec::new();

        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            let data = match self.objects.read_raw(&hash) {
                Ok((kind, data)) if kind == ObjectKind::Commit.as_str() => data,
                Ok((kind, _)) => {
                    warn!(hash = %hash, kind = %kind, "History entry is not a commit");
                    continue;
                }
                Err(e) => {
                    warn!(hash = %hash, error = %e, "Cannot read commit; history truncated");
                    continue;
                }
            };
            match parse_parents(&hash, &data) {
                Ok(parents) => queue.extend(parents),
                Err(e) => warn!(hash = %hash, error = %e, "Cannot parse commit parents"),
            }
            commits.push(hash);
        }
        commits
    }

    /// Follow annotated tags to the object they name.
    pub fn peel(&self, hash: &ObjectHash) -> Result<(ObjectHash, String), StatsError> {
        let mut current = hash.clone();
        for _ in 0..MAX_TAG_DEPTH {
            let (kind, data) = self.objects.read_raw(&current)?;
            if kind != "tag" {
                return Ok((current, kind));
            }
            let (target, _) = parse_tag(&data).ok_or_else(|| {
                StatsError::Repository(format!("tag {} has no object header", current))
            })?;
            current = target;
        }
        Err(StatsError::Repository(format!(
            "tag {} nests deeper than {} levels",
            hash, MAX_TAG_DEPTH
        )))
    }
}

impl RootProvider for RepoRootProvider<'_> {
    fn root_sets(&self) -> Result<Vec<RootSet>, StatsError> {
        let refs = self.list_refs()?;
        let mut sets = Vec::new();

        for (name, hash) in &refs {
            if let Some(branch) = name.strip_prefix(HEADS_PREFIX) {
                sets.push(RootSet {
                    name: branch.to_string(),
                    roots: self.history(hash),
                    expect: Some(ObjectKind::Commit),
                });
            }
        }

        for (name, hash) in &refs {
            let Some(tag) = name.strip_prefix(TAGS_PREFIX) else {
                continue;
            };
            match self.peel(hash) {
                Ok((target, kind)) => sets.push(RootSet {
                    name: format!("tag {}", tag),
                    roots: vec![target],
                    expect: (kind == ObjectKind::Commit.as_str()).then_some(ObjectKind::Commit),
                }),
                Err(e) => warn!(tag, error = %e, "Skipping unreadable tag"),
            }
        }

        Ok(sets)
    }
}
