//! Stable content hashing for cache keys.
//!
//! Large inputs are sampled instead of hashed byte-for-byte: the head, the
//! tail and an evenly strided set of interior bytes, plus the total length.
//! Collisions only need to be unlikely within one session, not adversarially
//! hard, so FNV-1a over the sample is enough.

/// Tunables for [`content_hash_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOptions {
    /// Inputs up to this many bytes are hashed in full.
    pub full_hash_limit: usize,
    /// Bytes taken from each end of a sampled input.
    pub edge_bytes: usize,
    /// Interior bytes sampled at an even stride.
    pub interior_samples: usize,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            full_hash_limit: 4096,
            edge_bytes: 1024,
            interior_samples: 512,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Hash `text` with the default options. Returns 16 lowercase hex digits.
pub fn content_hash(text: &str) -> String {
    content_hash_with(text, HashOptions::default())
}

pub fn content_hash_with(text: &str, options: HashOptions) -> String {
    let bytes = text.as_bytes();
    let mut hasher = Fnv1a::new();
    hasher.write(&(bytes.len() as u64).to_le_bytes());

    let sampled_size = options.edge_bytes * 2 + options.interior_samples;
    if bytes.len() <= options.full_hash_limit.max(sampled_size) {
        hasher.write(bytes);
    } else {
        let head = &bytes[..options.edge_bytes];
        let tail = &bytes[bytes.len() - options.edge_bytes..];
        let interior = &bytes[options.edge_bytes..bytes.len() - options.edge_bytes];

        hasher.write(head);
        if options.interior_samples > 0 {
            let stride = (interior.len() / options.interior_samples).max(1);
            for byte in interior.iter().step_by(stride).take(options.interior_samples) {
                hasher.write(&[*byte]);
            }
        }
        hasher.write(tail);
    }

    format!("{:016x}", hasher.finish())
}

/// Composite key for a processed artifact.
pub fn processed_key(content_hash: &str, op_type: &str, parameter: &str) -> String {
    format!("processed:{content_hash}:{op_type}:{parameter}")
}

/// Composite key for a translation.
pub fn translation_key(content_hash: &str, from: &str, to: &str) -> String {
    format!("translation:{content_hash}:{from}:{to}")
}
