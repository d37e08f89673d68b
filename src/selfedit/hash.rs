use std::collections::BTreeMap;

/// Content-addressed identity of a question/answer pair (blake3 hex hash).
pub type EditId = String;

/// Identity of a Q/A pair. Source and timestamps never take part, so two
/// records with the same text always collide.
pub fn edit_id(question: &str, answer: &str) -> EditId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(question.as_bytes());
    hasher.update(b"\n");
    hasher.update(answer.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// In-memory dedup index. `V` is `bool` for the primary store and the full
/// prior record for the reviewed store.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupIndex<V> {
    entries: BTreeMap<EditId, V>,
}

impl<V> Default for DedupIndex<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> DedupIndex<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<EditId, V>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns `false` if the identity was already present.
    pub fn insert(&mut self, id: EditId, value: V) -> bool {
        self.entries.insert(id, value).is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &BTreeMap<EditId, V> {
        &self.entries
    }
}
