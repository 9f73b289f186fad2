//! On-disk database version checking.
//!
//! A small status blob next to the chain store records which schema and
//! genesis the database was written against. On startup the checker decides
//! whether the store may be trusted, must be re-verified, or has to be wiped.

use alloy_rlp::{Decodable, Encodable, Header as RlpHeader};
use cinder_interfaces::WithExisting;
use cinder_primitives::{
    constants::{DATABASE_VERSION, MINOR_PROTOCOL_VERSION, PROTOCOL_VERSION},
    B256,
};
use std::path::{Path, PathBuf};
use tracing::warn;

const STATUS_FILE: &str = "status";

/// The persisted version tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Status {
    protocol_version: u64,
    minor_protocol_version: u64,
    database_version: u64,
    genesis_hash: B256,
}

impl Status {
    fn current(genesis_hash: B256) -> Self {
        Status {
            protocol_version: PROTOCOL_VERSION,
            minor_protocol_version: MINOR_PROTOCOL_VERSION,
            database_version: DATABASE_VERSION,
            genesis_hash,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let payload_length = self.protocol_version.length() +
            self.minor_protocol_version.length() +
            self.database_version.length() +
            self.genesis_hash.length();
        let mut buf = Vec::with_capacity(payload_length + 8);
        RlpHeader { list: true, payload_length }.encode(&mut buf);
        self.protocol_version.encode(&mut buf);
        self.minor_protocol_version.encode(&mut buf);
        self.database_version.encode(&mut buf);
        self.genesis_hash.encode(&mut buf);
        buf
    }

    /// Decodes a status blob. A three-item list predates the genesis field
    /// and is grandfathered in as matching `current_genesis`.
    fn decode(bytes: &[u8], current_genesis: B256) -> Option<Self> {
        let mut buf = bytes;
        let header = RlpHeader::decode(&mut buf).ok()?;
        if !header.list || buf.len() < header.payload_length {
            return None
        }
        let mut payload = &buf[..header.payload_length];

        let protocol_version = u64::decode(&mut payload).ok()?;
        let minor_protocol_version = u64::decode(&mut payload).ok()?;
        let database_version = u64::decode(&mut payload).ok()?;
        let genesis_hash = if payload.is_empty() {
            current_genesis
        } else {
            B256::decode(&mut payload).ok()?
        };

        Some(Status { protocol_version, minor_protocol_version, database_version, genesis_hash })
    }
}

/// Inspects the database status blob and decides whether the persistent
/// store may be trusted.
#[derive(Debug)]
pub struct VersionChecker {
    path: PathBuf,
    genesis_hash: B256,
    action: WithExisting,
}

impl VersionChecker {
    /// Reads `<db_path>/status` and derives the action to take.
    pub fn new(db_path: &Path, genesis_hash: B256) -> Self {
        let bytes = std::fs::read(db_path.join(STATUS_FILE)).unwrap_or_default();
        let action = match Status::decode(&bytes, genesis_hash) {
            Some(status)
                if status.database_version != DATABASE_VERSION ||
                    status.genesis_hash != genesis_hash =>
            {
                WithExisting::Kill
            }
            Some(status) if status.minor_protocol_version != MINOR_PROTOCOL_VERSION => {
                WithExisting::Verify
            }
            Some(_) => WithExisting::Trust,
            None => WithExisting::Kill,
        };
        VersionChecker { path: db_path.to_path_buf(), genesis_hash, action }
    }

    /// The action derived from the persisted status.
    pub fn action(&self) -> WithExisting {
        self.action
    }

    /// Records that startup succeeded by rewriting the status blob with the
    /// current version tuple.
    ///
    /// I/O failures are logged and swallowed; if the directory is genuinely
    /// unusable the chain store will surface its own error soon enough.
    pub fn set_ok(&self) {
        if self.action == WithExisting::Trust {
            return
        }
        if let Err(err) = std::fs::create_dir_all(&self.path) {
            warn!(target: "client::db", path = %self.path.display(), %err, "failed to create database directory");
        }
        let status = Status::current(self.genesis_hash);
        if let Err(err) = std::fs::write(self.path.join(STATUS_FILE), status.encode()) {
            warn!(target: "client::db", path = %self.path.display(), %err, "failed to write database status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Encodable;

    fn genesis() -> B256 {
        B256::repeat_byte(0x44)
    }

    #[test]
    fn missing_status_kills() {
        let dir = tempfile::tempdir().unwrap();
        let checker = VersionChecker::new(dir.path(), genesis());
        assert_eq!(checker.action(), WithExisting::Kill);
    }

    #[test]
    fn set_ok_round_trips_to_trust() {
        let dir = tempfile::tempdir().unwrap();
        let checker = VersionChecker::new(dir.path(), genesis());
        assert_eq!(checker.action(), WithExisting::Kill);
        checker.set_ok();

        let checker = VersionChecker::new(dir.path(), genesis());
        assert_eq!(checker.action(), WithExisting::Trust);
    }

    #[test]
    fn genesis_mismatch_kills() {
        let dir = tempfile::tempdir().unwrap();
        VersionChecker::new(dir.path(), genesis()).set_ok();

        let checker = VersionChecker::new(dir.path(), B256::repeat_byte(0x45));
        assert_eq!(checker.action(), WithExisting::Kill);
    }

    #[test]
    fn minor_version_mismatch_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let stale = Status {
            minor_protocol_version: MINOR_PROTOCOL_VERSION + 1,
            ..Status::current(genesis())
        };
        std::fs::write(dir.path().join(STATUS_FILE), stale.encode()).unwrap();

        let checker = VersionChecker::new(dir.path(), genesis());
        assert_eq!(checker.action(), WithExisting::Verify);
    }

    #[test]
    fn pre_genesis_schema_is_grandfathered() {
        let dir = tempfile::tempdir().unwrap();
        // three-item list: no genesis hash recorded
        let payload_length =
            PROTOCOL_VERSION.length() + MINOR_PROTOCOL_VERSION.length() + DATABASE_VERSION.length();
        let mut buf = Vec::new();
        RlpHeader { list: true, payload_length }.encode(&mut buf);
        PROTOCOL_VERSION.encode(&mut buf);
        MINOR_PROTOCOL_VERSION.encode(&mut buf);
        DATABASE_VERSION.encode(&mut buf);
        std::fs::write(dir.path().join(STATUS_FILE), buf).unwrap();

        let checker = VersionChecker::new(dir.path(), genesis());
        assert_eq!(checker.action(), WithExisting::Trust);
    }

    #[test]
    fn garbage_status_kills() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATUS_FILE), b"not rlp at all").unwrap();
        let checker = VersionChecker::new(dir.path(), genesis());
        assert_eq!(checker.action(), WithExisting::Kill);
    }
}
