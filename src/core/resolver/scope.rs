//! Directory scopes for the duplicate search.

use crate::error::ResolveError;
use std::path::{Path, PathBuf};

/// The optional duplicates and masters directories, made absolute.
///
/// Matching is component-wise, so `/photos2/a.jpg` is not under `/photos`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scopes {
    duplicates: Option<PathBuf>,
    masters: Option<PathBuf>,
}

impl Scopes {
    pub fn new(duplicates: Option<&Path>, masters: Option<&Path>) -> Result<Self, ResolveError> {
        Ok(Self {
            duplicates: duplicates.map(absolute).transpose()?,
            masters: masters.map(absolute).transpose()?,
        })
    }

    /// No scopes: the whole catalog is searched
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn duplicates(&self) -> Option<&Path> {
        self.duplicates.as_deref()
    }

    pub fn masters(&self) -> Option<&Path> {
        self.masters.as_deref()
    }

    /// Inside the duplicates scope; false when there is none
    pub fn in_duplicates(&self, path: &Path) -> bool {
        self.duplicates().is_some_and(|dir| path.starts_with(dir))
    }

    /// Inside the masters scope; false when there is none
    pub fn in_masters(&self, path: &Path) -> bool {
        self.masters().is_some_and(|dir| path.starts_with(dir))
    }

    /// Records the search starts from
    pub fn is_seed(&self, path: &Path) -> bool {
        match (self.masters(), self.duplicates()) {
            (Some(masters), _) => path.starts_with(masters),
            (None, Some(duplicates)) => path.starts_with(duplicates),
            (None, None) => true,
        }
    }

    /// Records a seed's matches may come from. With a masters scope the
    /// search is limited to the duplicates scope; otherwise masters may be
    /// found anywhere.
    pub fn in_search(&self, path: &Path) -> bool {
        match (self.masters(), self.duplicates()) {
            (Some(_), Some(duplicates)) => path.starts_with(duplicates),
            _ => true,
        }
    }

    /// Whether masters and duplicates are distinct directories
    pub fn masters_differ(&self) -> bool {
        self.masters != self.duplicates
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ResolveError> {
    std::path::absolute(path).map_err(|source| ResolveError::InvalidScope {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_is_component_wise() {
        let scopes = Scopes::new(Some(Path::new("/photos")), None).unwrap();

        assert!(scopes.in_duplicates(Path::new("/photos/2020/a.jpg")));
        assert!(!scopes.in_duplicates(Path::new("/photos2/a.jpg")));
        assert!(!scopes.in_masters(Path::new("/photos/a.jpg")));
    }

    #[test]
    fn seeds_follow_masters_then_duplicates() {
        let both = Scopes::new(Some(Path::new("/B")), Some(Path::new("/A"))).unwrap();
        assert!(both.is_seed(Path::new("/A/x.jpg")));
        assert!(!both.is_seed(Path::new("/B/x.jpg")));
        assert!(both.in_search(Path::new("/B/x.jpg")));
        assert!(!both.in_search(Path::new("/C/x.jpg")));

        let dups_only = Scopes::new(Some(Path::new("/B")), None).unwrap();
        assert!(dups_only.is_seed(Path::new("/B/x.jpg")));
        assert!(!dups_only.is_seed(Path::new("/C/x.jpg")));
        assert!(dups_only.in_search(Path::new("/C/x.jpg")));

        let none = Scopes::unrestricted();
        assert!(none.is_seed(Path::new("/anything")));
        assert!(none.in_search(Path::new("/anything")));
        assert!(!none.masters_differ());
    }

    #[test]
    fn relative_scopes_are_made_absolute() {
        let scopes = Scopes::new(Some(Path::new("dups")), None).unwrap();
        assert!(scopes.duplicates().unwrap().is_absolute());
    }
}
