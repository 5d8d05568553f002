use crate::error::CoreResult;
use crate::types::{DocPath, Document};

// ---------------------------------------------------------------------------
// DocumentStore: the document database interface
//
// The store owns transport, indexing and atomicity of single-document
// writes. Authorization is layered on top by the policy crate; the store
// itself never inspects who is asking.
// ---------------------------------------------------------------------------

pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &DocPath) -> CoreResult<Option<Document>>;

    /// Replace the document at `path` with `body`.
    fn set(&self, path: &DocPath, body: Document) -> CoreResult<()>;

    /// Returns true if a document was removed.
    fn delete(&self, path: &DocPath) -> CoreResult<bool>;

    /// Replace the document at `path` only if it still equals `expected`
    /// (`None` meaning nothing is stored). Compare and write are one step.
    ///
    /// Returns false, writing nothing, when the stored body differs.
    fn compare_and_swap(
        &self,
        path: &DocPath,
        expected: Option<&Document>,
        body: Document,
    ) -> CoreResult<bool>;

    /// Remove the document at `path` only if it still equals `expected`.
    /// Returns false when the stored body differs.
    fn compare_and_delete(
        &self,
        path: &DocPath,
        expected: Option<&Document>,
    ) -> CoreResult<bool>;

    fn exists(&self, path: &DocPath) -> CoreResult<bool> {
        Ok(self.get(path)?.is_some())
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    fn get(&self, path: &DocPath) -> CoreResult<Option<Document>> {
        (**self).get(path)
    }

    fn set(&self, path: &DocPath, body: Document) -> CoreResult<()> {
        (**self).set(path, body)
    }

    fn delete(&self, path: &DocPath) -> CoreResult<bool> {
        (**self).delete(path)
    }

    fn compare_and_swap(
        &self,
        path: &DocPath,
        expected: Option<&Document>,
        body: Document,
    ) -> CoreResult<bool> {
        (**self).compare_and_swap(path, expected, body)
    }

    fn compare_and_delete(
        &self,
        path: &DocPath,
        expected: Option<&Document>,
    ) -> CoreResult<bool> {
        (**self).compare_and_delete(path, expected)
    }

    fn exists(&self, path: &DocPath) -> CoreResult<bool> {
        (**self).exists(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_store_object_safe(_: &dyn DocumentStore) {}

    #[test]
    fn test_arc_store_delegates() {
        let store = std::sync::Arc::new(crate::memory::InMemoryStore::new());
        let path = DocPath::parse("configuration/theme").unwrap();
        assert!(!store.exists(&path).unwrap());
        store.set(&path, Document::new()).unwrap();
        assert!(store.exists(&path).unwrap());
    }
}
