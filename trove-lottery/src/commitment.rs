use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash commitment binding a round to its draw before the reveal starts.
///
/// The hash is published with the countdown; the nonce is only handed out
/// with the completed order, at which point anyone can recompute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCommitment {
    pub hash: String,
    pub nonce: String,
}

impl DrawCommitment {
    pub fn seal(order: &[String]) -> Self {
        let mut nonce = vec![0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        Self {
            hash: hex::encode(digest(&nonce, order)),
            nonce: hex::encode(nonce),
        }
    }

    pub fn verify(hash: &str, nonce: &str, order: &[String]) -> bool {
        match hex::decode(nonce) {
            Ok(nonce) => hex::encode(digest(&nonce, order)) == hash,
            Err(_) => false,
        }
    }
}

fn digest(nonce: &[u8], order: &[String]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    for id in order {
        hasher.update(id.as_bytes());
        // separator so ["ab","c"] and ["a","bc"] differ
        hasher.update([0u8]);
    }
    hasher.finalize().to_vec()
}
