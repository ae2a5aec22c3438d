//! Read-only client for the proof-set explorer API, used to report whether an
//! attached root is being proven.

use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPLORER_URL: &str = "https://calibration.pdp-explorer.eng.filoz.org";
pub const DEFAULT_ROOTS_LIMIT: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("explorer request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("explorer returned status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("failed to decode explorer response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSetRoots {
    pub data: Vec<ProofSetRoot>,
    pub metadata: RootsMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSetRoot {
    pub root_id: u64,
    pub cid: String,
    pub size: u64,
    pub removed: bool,
    pub total_periods_faulted: u64,
    pub total_proofs_submitted: u64,
    pub last_proven_epoch: u64,
    #[serde(default)]
    pub last_proven_at: Option<String>,
    pub last_faulted_epoch: u64,
    #[serde(default)]
    pub last_faulted_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootsMetadata {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Uploaded,
    Stored,
    StoredAndProven,
    StoredAndFaulty,
}

impl StorageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageStatus::Uploaded => "uploaded",
            StorageStatus::Stored => "stored",
            StorageStatus::StoredAndProven => "stored & proven",
            StorageStatus::StoredAndFaulty => "stored & faulty",
        }
    }
}

impl std::fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The explorer lists roots by the second half of a `piece:root` content id.
pub fn root_cid_of(content_id: &str) -> Option<&str> {
    content_id
        .split_once(':')
        .map(|(_, root)| root)
        .filter(|root| !root.is_empty())
}

/// Status of `root_cid` within a proof set's roots, or `None` when the root
/// is not listed at all.
///
/// Only roots with a proven or faulted epoch count as evidence. Any such root
/// proven before its last fault makes the status faulty; otherwise any proof
/// makes it proven. Listed roots without epochs are plainly stored.
pub fn classify_root_status(roots: &[ProofSetRoot], root_cid: &str) -> Option<StorageStatus> {
    let matching: Vec<&ProofSetRoot> = roots.iter().filter(|root| root.cid == root_cid).collect();
    if matching.is_empty() {
        return None;
    }

    let with_epochs: Vec<&&ProofSetRoot> = matching
        .iter()
        .filter(|root| root.last_proven_epoch > 0 || root.last_faulted_epoch > 0)
        .collect();

    let status = if with_epochs.iter().any(|root| {
        root.last_proven_epoch > 0 && root.last_proven_epoch < root.last_faulted_epoch
    }) {
        StorageStatus::StoredAndFaulty
    } else if with_epochs.iter().any(|root| root.last_proven_epoch > 0) {
        StorageStatus::StoredAndProven
    } else {
        StorageStatus::Stored
    };
    Some(status)
}

#[derive(Debug, Clone)]
pub struct ExplorerClient {
    base_url: String,
    roots_limit: u64,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, roots_limit: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            roots_limit,
        }
    }

    pub fn roots_url(&self, proof_set_id: u64) -> String {
        format!(
            "{}/api/proofsets/{}/roots?orderBy={}&limit={}",
            self.base_url,
            urlencoding::encode(&proof_set_id.to_string()),
            urlencoding::encode("root_id"),
            self.roots_limit
        )
    }

    pub fn fetch_roots(&self, proof_set_id: u64) -> Result<ProofSetRoots, ExplorerError> {
        let url = self.roots_url(proof_set_id);
        let response = match ureq::get(&url)
            .set("accept", "application/json")
            .set(
                "user-agent",
                concat!("pdpflow/", env!("CARGO_PKG_VERSION")),
            )
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(ExplorerError::Status { url, status })
            }
            Err(err) => {
                return Err(ExplorerError::Request {
                    url,
                    reason: err.to_string(),
                })
            }
        };

        response
            .into_json::<ProofSetRoots>()
            .map_err(|err| ExplorerError::Decode {
                url,
                reason: err.to_string(),
            })
    }

    /// Fetches the proof set and classifies the root behind `content_id`.
    pub fn root_status(
        &self,
        proof_set_id: u64,
        content_id: &str,
    ) -> Result<Option<StorageStatus>, ExplorerError> {
        let Some(root_cid) = root_cid_of(content_id) else {
            return Ok(None);
        };
        let roots = self.fetch_roots(proof_set_id)?;
        Ok(classify_root_status(&roots.data, root_cid))
    }
}
