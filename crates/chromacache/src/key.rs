//! Cache key derivation for link lookups

use chromacms::LinkRequest;

/// Identity of one cached transform
///
/// The cache map is keyed on the full tuple, so two requests collide
/// only when every component matches. The folded [`combined`] word is
/// a diagnostic fingerprint, never a correctness input — XOR-style
/// folds cancel across distinct triples and must not decide equality.
///
/// [`combined`]: LinkKey::combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkKey {
    /// Content hash of the source profile
    pub src_hash: u64,
    /// Content hash of the destination profile
    pub dst_hash: u64,
    /// Packed rendering parameters, mixed with the proof profile hash
    pub rend_hash: u64,
    /// Request carried a proofing profile
    pub includes_proof: bool,
}

impl LinkKey {
    /// Derive the key for a link request
    ///
    /// Each profile's memoized `content_hash` is computed at most once
    /// per profile, not per lookup.
    pub fn for_request(req: &LinkRequest<'_>) -> Self {
        let mut rend_hash = req.params.hash_bits();
        if let Some(proof) = req.proof {
            rend_hash ^= mix64(proof.content_hash());
        }
        LinkKey {
            src_hash: req.src.content_hash(),
            dst_hash: req.dst.content_hash(),
            rend_hash,
            includes_proof: req.proof.is_some(),
        }
    }

    /// Source and destination describe the same color space with no
    /// proofing in between; the pipeline may skip `apply` entirely.
    pub fn is_identity(&self) -> bool {
        self.src_hash == self.dst_hash && !self.includes_proof
    }

    /// 64-bit fingerprint of the whole key, for log lines
    pub fn combined(&self) -> u64 {
        let mut h = 0x9e37_79b9_7f4a_7c15u64;
        h = mix64(h ^ self.src_hash);
        h = mix64(h ^ self.dst_hash);
        h = mix64(h ^ self.rend_hash);
        mix64(h ^ self.includes_proof as u64)
    }
}

// splitmix64 finalizer
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
