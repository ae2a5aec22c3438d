use getrandom::getrandom;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const KEY_HASH_BYTES: usize = 8;
const KEY_STEM_MAX_CHARS: usize = 48;

pub fn validate_key_value(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("workflow key must be non-empty".to_string());
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err("workflow key must use only ASCII letters, digits, '-' or '_'".to_string())
}

/// Identity of one logical file's workflow. Two different files never share
/// a key; the same bytes under the same name always map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkflowKey(String);

impl WorkflowKey {
    pub fn parse(raw: &str) -> Result<Self, String> {
        validate_key_value(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Derives the key from the file name and a SHA-256 digest of its content.
    pub fn for_file(path: &Path) -> std::io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0_u8; 8192];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        let digest = hasher.finalize();
        let hash = digest[..KEY_HASH_BYTES]
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        let stem = path
            .file_name()
            .and_then(|v| v.to_str())
            .map(sanitize_stem)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self(format!("{stem}-{hash}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for WorkflowKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .map_err(|err| D::Error::custom(format!("invalid workflow key `{raw}`: {err}")))
    }
}

fn sanitize_stem(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(KEY_STEM_MAX_CHARS)
        .collect()
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

/// Compact id for one run attempt, e.g. `run-lx3k9a-0f2q`.
pub fn generate_run_id(now: i64) -> Result<String, String> {
    let timestamp =
        u64::try_from(now).map_err(|_| "run id requires a non-negative timestamp".to_string())?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes).map_err(|err| format!("failed to generate run id randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % (36 * 36 * 36 * 36);
    let suffix = format!("{:0>4}", base36_encode_u64(u64::from(sample)));
    Ok(format!("run-{}-{suffix}", base36_encode_u64(timestamp)))
}
