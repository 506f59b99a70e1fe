//! The join-code allocator.
//!
//! Join codes are the short numeric strings players type to find a
//! lobby. They must be unique among live sessions but get recycled
//! freely once a session leaves the lobby, so the allocator is nothing
//! but a guarded set of "currently printed on someone's screen" codes.
//!
//! The set is process-local: it is reseeded from the store at startup
//! (before the server accepts traffic) and never persisted itself.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::Rng;

use crate::SessionError;

/// Candidates drawn per length before conceding the space is congested.
///
/// With the session count far below the code space this bound is never
/// reached in practice; it exists so a badly misconfigured install
/// (code_length 1, say) degrades into longer codes instead of spinning.
const MINT_ATTEMPTS_PER_LENGTH: usize = 64;

/// How many times we fall back to a one-digit-longer code.
const MAX_WIDENINGS: usize = 2;

/// Mints and tracks unique join codes.
///
/// Mint-then-reserve happens under one lock so two concurrent session
/// creations can never draw the same code; everything else about the
/// allocator is a plain set.
pub struct CodeAllocator {
    used: Mutex<HashSet<String>>,
    length: usize,
}

impl CodeAllocator {
    /// An empty allocator minting codes of `length` digits.
    pub fn new(length: usize) -> Self {
        Self {
            used: Mutex::new(HashSet::new()),
            length,
        }
    }

    /// Bulk-reserves codes recovered from the store at startup.
    pub fn seed<I>(&self, codes: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut used = self.used.lock().expect("code set lock");
        used.extend(codes);
    }

    /// Draws a code no live session is using and reserves it.
    ///
    /// Rejection sampling at the configured length; if the space is
    /// congested the length is widened a digit at a time (twice at
    /// most) before giving up.
    ///
    /// # Errors
    /// [`SessionError::CodesExhausted`] when every candidate collided.
    pub fn mint(&self) -> Result<String, SessionError> {
        let mut used = self.used.lock().expect("code set lock");
        let mut rng = rand::rng();

        for widening in 0..=MAX_WIDENINGS {
            let length = self.length + widening;
            for _ in 0..MINT_ATTEMPTS_PER_LENGTH {
                let code = random_code(&mut rng, length);
                if !used.contains(&code) {
                    used.insert(code.clone());
                    return Ok(code);
                }
            }
            tracing::warn!(
                length,
                reserved = used.len(),
                "join-code space congested, widening",
            );
        }

        Err(SessionError::CodesExhausted)
    }

    /// Returns a code to the pool. Idempotent: releasing a code that was
    /// never reserved (or was released twice) is a no-op.
    pub fn release(&self, code: &str) {
        let mut used = self.used.lock().expect("code set lock");
        used.remove(code);
    }

    /// Whether a code is currently reserved.
    pub fn is_reserved(&self, code: &str) -> bool {
        self.used.lock().expect("code set lock").contains(code)
    }

    /// Number of codes currently reserved.
    pub fn reserved(&self) -> usize {
        self.used.lock().expect("code set lock").len()
    }
}

fn random_code(rng: &mut impl Rng, length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10)))
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_returns_numeric_code_of_configured_length() {
        let allocator = CodeAllocator::new(6);

        let code = allocator.mint().unwrap();

        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(allocator.is_reserved(&code));
    }

    #[test]
    fn test_mint_never_repeats_a_reserved_code() {
        // Exhaust a meaningful share of a tiny space; every draw must
        // still be unique because reservation happens under the lock.
        let allocator = CodeAllocator::new(2);
        let mut seen = HashSet::new();

        for _ in 0..50 {
            let code = allocator.mint().unwrap();
            assert!(seen.insert(code), "allocator repeated a code");
        }
        assert_eq!(allocator.reserved(), 50);
    }

    #[test]
    fn test_mint_widens_when_the_space_is_full() {
        let allocator = CodeAllocator::new(1);
        allocator.seed((0..10).map(|d| d.to_string()));

        let code = allocator.mint().unwrap();

        assert!(
            code.len() > 1,
            "with all 1-digit codes taken the mint must widen, got {code}"
        );
    }

    #[test]
    fn test_mint_fails_when_widened_spaces_are_full_too() {
        let allocator = CodeAllocator::new(1);
        allocator.seed((0..10).map(|d| d.to_string()));
        allocator.seed((0..100).map(|d| format!("{d:02}")));
        allocator.seed((0..1000).map(|d| format!("{d:03}")));

        let err = allocator.mint().unwrap_err();

        assert!(matches!(err, SessionError::CodesExhausted));
    }

    #[test]
    fn test_release_makes_a_code_reusable() {
        let allocator = CodeAllocator::new(6);
        let code = allocator.mint().unwrap();

        allocator.release(&code);

        assert!(!allocator.is_reserved(&code));
        assert_eq!(allocator.reserved(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let allocator = CodeAllocator::new(6);
        let code = allocator.mint().unwrap();

        allocator.release(&code);
        allocator.release(&code);
        allocator.release("never-minted");

        assert_eq!(allocator.reserved(), 0);
    }

    #[test]
    fn test_seed_reserves_recovered_codes() {
        let allocator = CodeAllocator::new(6);

        allocator.seed(vec!["111111".to_string(), "222222".to_string()]);

        assert!(allocator.is_reserved("111111"));
        assert!(allocator.is_reserved("222222"));
        assert_eq!(allocator.reserved(), 2);
    }

    #[test]
    fn test_concurrent_mints_stay_unique() {
        // Many threads minting at once against a small space; the lock
        // around mint-then-reserve is what keeps these disjoint.
        use std::sync::Arc;

        let allocator = Arc::new(CodeAllocator::new(3));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(std::thread::spawn(move || {
                (0..25)
                    .map(|_| allocator.mint().unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for code in handle.join().unwrap() {
                assert!(all.insert(code), "two threads drew the same code");
            }
        }
        assert_eq!(allocator.reserved(), 200);
    }
}
