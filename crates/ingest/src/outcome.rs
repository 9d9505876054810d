/// How the pipeline disposed of one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Persisted; remote party is a one-to-one chat.
    InsertedIndividual,
    /// Persisted; remote party is a group.
    InsertedGroup,
    /// Persisted; remote party is a broadcast list.
    InsertedBroadcast,
    /// A row with this (message_id, session_key) already exists.
    Duplicate,
    /// Older than the freshness window at arrival.
    Stale,
    /// Missing identifiers or payload, or the session is not authenticated
    /// yet — nothing is persisted before authentication completes.
    Invalid,
}

impl IngestOutcome {
    pub fn is_inserted(self) -> bool {
        matches!(
            self,
            Self::InsertedIndividual | Self::InsertedGroup | Self::InsertedBroadcast
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsertedIndividual => "inserted-individual",
            Self::InsertedGroup => "inserted-group",
            Self::InsertedBroadcast => "inserted-broadcast",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
            Self::Invalid => "invalid",
        }
    }
}
