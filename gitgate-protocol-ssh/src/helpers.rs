use gitgate_common::ClientIdentity;
use russh::keys::{HashAlg, PrivateKey, PublicKey, PublicKeyBase64};

pub trait PublicKeyAsOpenSSH {
    fn as_openssh(&self) -> String;
}

impl PublicKeyAsOpenSSH for PrivateKey {
    fn as_openssh(&self) -> String {
        let mut buf = String::new();
        buf.push_str(self.algorithm().as_str());
        buf.push(' ');
        buf.push_str(&self.public_key_base64());
        buf
    }
}

/// Identity of a client whose key has been accepted.
pub fn client_identity(username: &str, key: &PublicKey) -> ClientIdentity {
    ClientIdentity {
        username: username.to_owned(),
        public_key: key.public_key_base64(),
        fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
    }
}
