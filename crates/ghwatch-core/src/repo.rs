use std::fmt;
use std::str::FromStr;

/// The repository a watcher is scoped to: `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoKey {
    owner: String,
    name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepoKeyError {
    #[error("repository must be given as owner/name, got {0:?}")]
    Malformed(String),
    #[error("repository {0:?} contains characters outside [A-Za-z0-9._-]")]
    InvalidChars(String),
}

impl RepoKey {
    pub fn new(owner: &str, name: &str) -> Result<Self, RepoKeyError> {
        let full = format!("{owner}/{name}");
        if owner.is_empty() || name.is_empty() {
            return Err(RepoKeyError::Malformed(full));
        }
        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        };
        if !valid(owner) || !valid(name) {
            return Err(RepoKeyError::InvalidChars(full));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystem-safe form, used for lock file names.
    pub fn slug(&self) -> String {
        format!("{}__{}", self.owner, self.name)
    }
}

impl FromStr for RepoKey {
    type Err = RepoKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        match trimmed.split_once('/') {
            Some((owner, name)) if !name.contains('/') => Self::new(owner, name),
            _ => Err(RepoKeyError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
