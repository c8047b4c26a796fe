use crate::source::RecordId;

// ids removed on this client; they only ever grow and are sent as an exclusion filter
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeletionTracker {
    ids: Vec<RecordId>,
}

impl DeletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(&mut self, id: RecordId) {
        self.ids.push(id);
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    // the exclusion list as it stands when a request is issued
    pub fn snapshot(&self) -> Vec<RecordId> {
        self.ids.clone()
    }
}
