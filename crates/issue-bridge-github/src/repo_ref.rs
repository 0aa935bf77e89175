use std::fmt;

use crate::github_error::GithubError;

/// `owner/repo` slug of the destination repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, GithubError> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| GithubError::InvalidRepo(raw.to_string()))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(GithubError::InvalidRepo(raw.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::RepoRef;
    use crate::GithubError;

    #[test]
    fn unit_repo_ref_parses_and_trims_slug() {
        let repo = RepoRef::parse("  acme / widgets ").expect("repo");
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.as_slug(), "acme/widgets");
        assert_eq!(repo.to_string(), "acme/widgets");
    }

    #[test]
    fn regression_repo_ref_rejects_malformed_slugs() {
        for raw in ["", "acme", "acme/", "/widgets", "acme/widgets/extra"] {
            assert!(
                matches!(RepoRef::parse(raw), Err(GithubError::InvalidRepo(_))),
                "{raw} should be rejected"
            );
        }
    }
}
