//! Issue creation against the GitHub REST API.
//!
//! [`GithubIssueClient`] submits one issue per call, retrying server and
//! network failures through the shared [`issue_bridge_core::RetryPolicy`] and
//! failing fast once the API quota is exhausted. In dry-run mode it never
//! touches the network and hands back the payload it would have sent.

pub mod github_error;
pub mod issue_client;
pub mod repo_ref;

pub use github_error::GithubError;
pub use issue_client::{
    CreatedIssue, GithubIssueClient, GithubIssueClientConfig, IssueCreation, IssueDraft,
    IssuePayload, DEFAULT_GITHUB_API_BASE,
};
pub use repo_ref::RepoRef;
