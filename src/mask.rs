use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// XORs the 4-byte key over the buffer, starting at offset 0. Applying the
/// same key twice restores the original bytes, so masking and unmasking are
/// the same operation.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Source of per-frame mask keys. Clients are required to pick a fresh,
/// unpredictable key for every frame they send.
pub trait Masker: Send {
    fn next_key(&mut self) -> [u8; 4];
}

/// Production masker backed by a cryptographically seeded RNG.
pub struct RandomMasker {
    rng: StdRng,
}

impl RandomMasker {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Default for RandomMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl Masker for RandomMasker {
    fn next_key(&mut self) -> [u8; 4] {
        self.rng.random()
    }
}

/// Emits the same key for every frame. Only useful to make test output
/// byte-for-byte reproducible.
pub struct FixedMasker(pub [u8; 4]);

impl Masker for FixedMasker {
    fn next_key(&mut self) -> [u8; 4] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_is_an_involution() {
        let key = [0x37, 0xFA, 0x21, 0x3D];
        let original: Vec<u8> = (0u8..=255).collect();
        let mut buf = original.clone();

        apply_mask(&mut buf, key);
        assert_ne!(buf, original);
        apply_mask(&mut buf, key);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_known_mask_vector() {
        // "Hello" masked with 37 FA 21 3D, from the RFC examples
        let mut buf = b"Hello".to_vec();
        apply_mask(&mut buf, [0x37, 0xFA, 0x21, 0x3D]);
        assert_eq!(buf, [0x7F, 0x9F, 0x4D, 0x51, 0x58]);
    }

    #[test]
    fn test_fixed_masker_repeats() {
        let mut masker = FixedMasker([1, 2, 3, 4]);
        assert_eq!(masker.next_key(), masker.next_key());
    }

    #[test]
    fn test_random_masker_varies() {
        let mut masker = RandomMasker::new();
        let keys: Vec<[u8; 4]> = (0..16).map(|_| masker.next_key()).collect();
        assert!(keys.windows(2).any(|w| w[0] != w[1]));
    }
}
