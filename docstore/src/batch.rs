use std::collections::BTreeMap;

use crate::FieldValue;

pub type FieldWrites = BTreeMap<String, FieldValue>;

/// A single document mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or fully replace the document.
    Set {
        collection: String,
        id: String,
        fields: FieldWrites,
    },
    /// Merge the given fields into an existing document. Fails if the
    /// document does not exist.
    Update {
        collection: String,
        id: String,
        fields: FieldWrites,
    },
    /// Remove the document. Deleting a missing document is not an error.
    Delete { collection: String, id: String },
}

impl Write {
    pub fn collection(&self) -> &str {
        match self {
            Write::Set { collection, .. }
            | Write::Update { collection, .. }
            | Write::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Write::Set { id, .. } | Write::Update { id, .. } | Write::Delete { id, .. } => id,
        }
    }
}

/// An ordered group of writes committed atomically: either every write is
/// applied or none is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: impl Into<String>, id: impl Into<String>, fields: FieldWrites) -> &mut Self {
        self.writes.push(Write::Set {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn update(&mut self, collection: impl Into<String>, id: impl Into<String>, fields: FieldWrites) -> &mut Self {
        self.writes.push(Write::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.writes.push(Write::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}
