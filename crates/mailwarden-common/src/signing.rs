//! HMAC signing for links embedded in outgoing mail

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::{ContactId, ListId};
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies unsubscribe links (`cid`/`lid` pairs)
#[derive(Clone)]
pub struct LinkSigner {
    keyed: HmacSha256,
}

impl LinkSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let keyed = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| Error::Config(format!("Invalid signing secret: {}", e)))?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Hex-encoded HMAC-SHA256 over `"{contact_id}:{list_id}"`
    pub fn sign_unsubscribe(&self, contact_id: ContactId, list_id: ListId) -> String {
        let mut mac = self.mac();
        mac.update(format!("{}:{}", contact_id, list_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time verification of an unsubscribe signature
    pub fn verify_unsubscribe(&self, contact_id: ContactId, list_id: ListId, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(format!("{}:{}", contact_id, list_id).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_signature_roundtrip() {
        let signer = LinkSigner::new("secret").unwrap();
        let (cid, lid) = (Uuid::new_v4(), Uuid::new_v4());

        let sig = signer.sign_unsubscribe(cid, lid);
        assert_eq!(sig.len(), 64);
        assert!(signer.verify_unsubscribe(cid, lid, &sig));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let signer = LinkSigner::new("secret").unwrap();
        let (cid, lid) = (Uuid::new_v4(), Uuid::new_v4());
        let sig = signer.sign_unsubscribe(cid, lid);

        assert!(!signer.verify_unsubscribe(cid, Uuid::new_v4(), &sig));
        assert!(!signer.verify_unsubscribe(cid, lid, "not-hex"));
        assert!(!LinkSigner::new("other").unwrap().verify_unsubscribe(cid, lid, &sig));
    }
}
