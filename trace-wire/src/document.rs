//! Dynamic-lookup access on the decoded document tree.
//!
//! The body of a [`crate::message::MongoMessage`] is a `bson::Document`:
//! `bson` is the embedded binary-document codec this pipeline treats as an
//! external library, per the distilled spec's scope. `Document` already
//! preserves field insertion order, which is what the "first key is the
//! command name" rule and the OP_MSG body-merge step both rely on.

use bson::{Bson, Document};

/// Recursive dotted-path lookup on a decoded document, mirroring the
/// source's `safe_get("a.b.c")`.
pub trait SafeGet {
    fn safe_get(&self, path: &str) -> Option<&Bson>;
}

impl SafeGet for Document {
    fn safe_get(&self, path: &str) -> Option<&Bson> {
        let mut current: &Bson = self.get(path.split('.').next()?)?;
        let mut segments = path.split('.');
        segments.next();

        for segment in segments {
            current = current.as_document()?.get(segment)?;
        }

        Some(current)
    }
}
