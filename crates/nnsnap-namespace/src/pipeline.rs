use nnsnap_types::{FileId, Replication};

/// Physical replication pipeline: receives the replication each file's
/// blocks must be kept at, after every change of that requirement.
pub trait ReplicationPipeline: Send {
    fn set_target_replication(&mut self, file: FileId, factor: Replication);
}

/// Pipeline that records requests in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingPipeline {
    requests: Vec<(FileId, Replication)>,
}

impl RecordingPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requests(&self) -> &[(FileId, Replication)] {
        &self.requests
    }

    /// Most recent target sent for `file`.
    #[must_use]
    pub fn target(&self, file: FileId) -> Option<Replication> {
        self.requests
            .iter()
            .rev()
            .find(|(id, _)| *id == file)
            .map(|(_, factor)| *factor)
    }
}

impl ReplicationPipeline for RecordingPipeline {
    fn set_target_replication(&mut self, file: FileId, factor: Replication) {
        self.requests.push((file, factor));
    }
}
