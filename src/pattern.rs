//! Glob search over directory trees, one path segment at a time.
//!
//! A pattern is split on `/`. Literal segments are looked up by exact name;
//! segments containing any of `? * [ { \` are compiled with `globset` and
//! tested against every entry of the directory being searched. Only files are
//! ever returned, and only when they match the final segment.
//!
//! Patterns arrive already resolved by the caller's [`PathResolver`], so `..`
//! has been applied and has no meaning here.
//!
//! [`PathResolver`]: crate::path::PathResolver

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{VfsError, VfsResult};
use crate::path::SEPARATOR;

const META: [char; 5] = ['?', '*', '[', '{', '\\'];

pub fn is_pattern(segment: &str) -> bool {
    segment.contains(META)
}

/// One compiled pattern segment.
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Wildcard(GlobMatcher),
}

impl Segment {
    /// With `fold_case`, wildcards also match names that differ only in case.
    pub fn compile(segment: &str, fold_case: bool) -> VfsResult<Self> {
        if !is_pattern(segment) {
            return Ok(Segment::Literal(segment.to_string()));
        }
        let glob = GlobBuilder::new(segment)
            .case_insensitive(fold_case)
            .build()
            .map_err(|e| VfsError::Pattern {
                pattern: segment.to_string(),
                message: e.kind().to_string(),
            })?;
        Ok(Segment::Wildcard(glob.compile_matcher()))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == name,
            Segment::Wildcard(matcher) => matcher.is_match(name),
        }
    }
}

/// Compiles every segment of a pattern. Empty and `.` segments are skipped.
pub fn compile(pattern: &str, fold_case: bool) -> VfsResult<Vec<Segment>> {
    pattern
        .split(SEPARATOR)
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| Segment::compile(s, fold_case))
        .collect()
}

/// Entries of one directory, as seen by the search.
#[derive(Debug)]
pub struct Listing<D> {
    /// Child directories, by name.
    pub dirs: Vec<(String, D)>,
    /// Files, by name, with their full paths.
    pub files: Vec<(String, String)>,
}

impl<D> Default for Listing<D> {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// A directory tree the glob search can descend.
pub trait Searchable {
    type Dir;

    /// The child directory `name` of `dir`, if there is one.
    fn child_dir(&self, dir: &Self::Dir, name: &str) -> VfsResult<Option<Self::Dir>>;

    /// Full path of the file `name` in `dir`, if there is one.
    fn child_file(&self, dir: &Self::Dir, name: &str) -> VfsResult<Option<String>>;

    fn list(&self, dir: &Self::Dir) -> VfsResult<Listing<Self::Dir>>;
}

/// Runs one pattern from `start` and returns the matching file paths.
pub fn search<T: Searchable>(
    tree: &T,
    start: T::Dir,
    pattern: &str,
    fold_case: bool,
) -> VfsResult<Vec<String>> {
    let segments = compile(pattern, fold_case)?;
    let mut found = Vec::new();
    descend(tree, start, &segments, &mut found)?;
    Ok(found)
}

fn descend<T: Searchable>(
    tree: &T,
    dir: T::Dir,
    segments: &[Segment],
    found: &mut Vec<String>,
) -> VfsResult<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(());
    };

    match segment {
        Segment::Literal(name) => {
            if let Some(child) = tree.child_dir(&dir, name)? {
                return descend(tree, child, rest, found);
            }
            if rest.is_empty() {
                if let Some(path) = tree.child_file(&dir, name)? {
                    found.push(path);
                }
            }
        }
        Segment::Wildcard(_) => {
            let listing = tree.list(&dir)?;
            if rest.is_empty() {
                found.extend(
                    listing
                        .files
                        .into_iter()
                        .filter(|(name, _)| segment.matches(name))
                        .map(|(_, path)| path),
                );
            } else {
                for (name, child) in listing.dirs {
                    if segment.matches(&name) {
                        descend(tree, child, rest, found)?;
                    }
                }
            }
        }
    }
    Ok(())
}
