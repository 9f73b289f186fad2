/// The state the peer network is in when it comes to synchronisation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Node sync is complete; the network only serves keep-up requests.
    #[default]
    Idle,
    /// The network is downloading and importing chain history.
    Syncing,
}

impl SyncState {
    /// Whether the node is currently syncing.
    pub const fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}
