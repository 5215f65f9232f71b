//! Inbound webhook event model.
//!
//! Push payload fields are deserialized leniently: a missing repository or
//! ref becomes an empty string and is rejected later by the matcher rather
//! than failing the whole request.

use serde::Deserialize;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Subset of the GitHub push payload the dispatcher cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub repository: Repository,
    /// Head commit sha after the push.
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub id: String,
}

/// A decoded inbound event, independent of the wire payload shape.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub kind: String,
    pub repository: String,
    pub git_ref: String,
    pub commit_sha: Option<String>,
}

impl InboundEvent {
    pub fn from_payload(kind: &str, payload: &PushPayload) -> Self {
        let commit_sha = payload
            .after
            .clone()
            .filter(|sha| !sha.is_empty())
            .or_else(|| {
                payload
                    .head_commit
                    .as_ref()
                    .map(|c| c.id.clone())
                    .filter(|sha| !sha.is_empty())
            });

        Self {
            kind: kind.to_string(),
            repository: payload.repository.full_name.clone(),
            git_ref: payload.git_ref.clone(),
            commit_sha,
        }
    }

    /// Branch name derived from the ref: the suffix after `refs/heads/`,
    /// or the raw ref if that prefix is absent.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(&self.git_ref)
    }

    pub fn is_push(&self) -> bool {
        self.kind == "push"
    }
}
