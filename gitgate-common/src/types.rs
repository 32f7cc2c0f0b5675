use std::fmt::{Display, Formatter};

use uuid::Uuid;

pub type SessionId = Uuid;

/// The principal a connection authenticated as.
///
/// Created once by the public key callback and shared read-only with every
/// channel of that connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub username: String,
    /// Base64 of the SSH wire encoding of the public key.
    pub public_key: String,
    pub fingerprint: String,
}

impl Display for ClientIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.username, self.fingerprint)
    }
}
