use regex::Regex;
use std::sync::OnceLock;

fn content_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"baga[a-zA-Z0-9]+:[a-zA-Z0-9]+").expect("valid pattern"))
}

fn confirmation_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"0x[a-fA-F0-9]{64}").expect("valid pattern"))
}

fn proof_set_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ProofSet ID:\s*(\d+)").expect("valid pattern"))
}

/// Leftmost `baga...:...` identifier printed by `upload-file`.
pub fn parse_content_id(output: &str) -> Option<String> {
    content_id_pattern()
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Leftmost `0x` + 64 hex digit transaction hash printed by `create-proof-set`.
pub fn parse_confirmation_ref(output: &str) -> Option<String> {
    confirmation_ref_pattern()
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Numeric id following `ProofSet ID:` in the creation status report.
/// Digit runs that overflow `u64` count as no match.
pub fn parse_proof_set_id(output: &str) -> Option<u64> {
    proof_set_id_pattern()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";

    #[test]
    fn content_id_takes_leftmost_match() {
        let out = "stored as baga6ea4seaqabc:abc123 done; also bagaz:zz";
        assert_eq!(
            parse_content_id(out).as_deref(),
            Some("baga6ea4seaqabc:abc123")
        );
    }

    #[test]
    fn content_id_requires_both_halves() {
        assert_eq!(parse_content_id("baga6ea4seaq: nothing"), None);
        assert_eq!(parse_content_id("no identifier here"), None);
        assert_eq!(parse_content_id(""), None);
    }

    #[test]
    fn confirmation_ref_matches_mixed_case_hex() {
        let mixed = "0xDEADbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadBEEF";
        let out = format!("tx sent: {mixed}\nwaiting");
        assert_eq!(parse_confirmation_ref(&out).as_deref(), Some(mixed));
    }

    #[test]
    fn confirmation_ref_ignores_short_hashes() {
        assert_eq!(parse_confirmation_ref("0xdeadbeef"), None);
        let out = format!("first {HASH_A} second 0x{}", "1".repeat(64));
        assert_eq!(parse_confirmation_ref(&out).as_deref(), Some(HASH_A));
    }

    #[test]
    fn proof_set_id_tolerates_whitespace() {
        assert_eq!(parse_proof_set_id("ProofSet ID:   42"), Some(42));
        assert_eq!(parse_proof_set_id("Status: ok\nProofSet ID:\t7\n"), Some(7));
        assert_eq!(parse_proof_set_id("ProofSet ID:7"), Some(7));
    }

    #[test]
    fn proof_set_id_absent_while_pending() {
        assert_eq!(parse_proof_set_id("Proof set creation pending"), None);
        assert_eq!(parse_proof_set_id("ProofSet ID: unknown"), None);
        assert_eq!(
            parse_proof_set_id("ProofSet ID: 99999999999999999999999"),
            None
        );
    }
}
