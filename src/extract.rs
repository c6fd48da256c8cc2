//! Extraction of executable units from a rendered document.
//!
//! A pure transform: walk the document's nodes in order, keep the ones
//! flagged executable, trim their text, and copy their attributes onto
//! [`Unit`]s. Document order is the execution order; nothing here reorders,
//! filters on type, or fails - a malformed document simply yields no units.

use crate::ir::Document;
use crate::unit::{Unit, UnitKind};

/// Extract the ordered executable units of a document.
pub fn units(doc: &Document) -> Vec<Unit> {
    doc.nodes
        .iter()
        .filter(|node| node.executable)
        .enumerate()
        .map(|(index, node)| Unit {
            index,
            kind: UnitKind::parse(node.kind.as_deref()),
            content: node.text.trim().to_string(),
            path: node.path.clone(),
            user: node.user.clone(),
            persistent: node.persistent.clone(),
            privileged: node.privileged,
            stream: node.stream,
            failed_when: node.failed_when.clone(),
            variables: node.variables.clone(),
            target: node.target.clone(),
            permission: node.permission.clone(),
        })
        .collect()
}
