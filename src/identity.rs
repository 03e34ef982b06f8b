use std::collections::HashSet;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use ulid::Ulid;

/// Black-box guest-verification predicate. Registration, document checks
/// and owner onboarding live in an external system; the engine only asks
/// whether a guest id has cleared it.
pub trait IdentityProvider: Send + Sync {
    fn is_verified(&self, guest_id: Ulid) -> bool;
}

/// Verification delegated upstream — every guest id passes. For
/// deployments where the fronting service rejects unverified guests
/// before they reach the engine.
pub struct AssumeVerified;

impl IdentityProvider for AssumeVerified {
    fn is_verified(&self, _guest_id: Ulid) -> bool {
        true
    }
}

/// Allow-list provider: one guest ULID per line, `#` comments and blank
/// lines ignored. The file is maintained by the external identity system.
pub struct VerifiedGuestFile {
    guests: HashSet<Ulid>,
}

impl VerifiedGuestFile {
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut guests = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let id = Ulid::from_string(trimmed).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("bad guest id {trimmed}: {e}"))
            })?;
            guests.insert(id);
        }
        Ok(Self { guests })
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }
}

impl IdentityProvider for VerifiedGuestFile {
    fn is_verified(&self, guest_id: Ulid) -> bool {
        self.guests.contains(&guest_id)
    }
}

/// Explicit in-memory set, injected per test.
#[derive(Default)]
pub struct StaticVerifier {
    verified: HashSet<Ulid>,
}

impl StaticVerifier {
    pub fn new<I: IntoIterator<Item = Ulid>>(verified: I) -> Self {
        Self {
            verified: verified.into_iter().collect(),
        }
    }
}

impl IdentityProvider for StaticVerifier {
    fn is_verified(&self, guest_id: Ulid) -> bool {
        self.verified.contains(&guest_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn assume_verified_accepts_anyone() {
        assert!(AssumeVerified.is_verified(Ulid::new()));
    }

    #[test]
    fn static_verifier_checks_membership() {
        let known = Ulid::new();
        let provider = StaticVerifier::new([known]);
        assert!(provider.is_verified(known));
        assert!(!provider.is_verified(Ulid::new()));
    }

    #[test]
    fn guest_file_parses_lines_and_comments() {
        let dir = std::env::temp_dir().join("stayd_test_identity");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("guests_{}.txt", Ulid::new()));

        let a = Ulid::new();
        let b = Ulid::new();
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "# verified guests").unwrap();
            writeln!(f, "{a}").unwrap();
            writeln!(f).unwrap();
            writeln!(f, "  {b}  ").unwrap();
        }

        let provider = VerifiedGuestFile::load(&path).unwrap();
        assert_eq!(provider.len(), 2);
        assert!(provider.is_verified(a));
        assert!(provider.is_verified(b));
        assert!(!provider.is_verified(Ulid::new()));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn guest_file_rejects_garbage() {
        let dir = std::env::temp_dir().join("stayd_test_identity");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("bad_{}.txt", Ulid::new()));
        std::fs::write(&path, "not-a-ulid\n").unwrap();

        assert!(VerifiedGuestFile::load(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
