//! The presentation context table negotiated for an established
//! association (spec §4.3).
//!
//! Once negotiation completes, every accepted presentation context maps
//! one odd-valued context id to a transfer syntax; DIMSE messages are
//! sent and received against a context id, never against the abstract
//! syntax directly.

use pacs_core::Uid;

/// One entry of a negotiated presentation context table.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PresentationContext {
    pub id: u8,
    pub abstract_syntax: Uid,
    pub transfer_syntax: Uid,
}

/// The accepted presentation contexts of an established association,
/// indexed for lookup in both directions.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PresentationContextTable {
    contexts: Vec<PresentationContext>,
}

impl PresentationContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context: PresentationContext) {
        self.contexts.push(context);
    }

    pub fn transfer_syntax_for(&self, id: u8) -> Option<&Uid> {
        self.contexts
            .iter()
            .find(|c| c.id == id)
            .map(|c| &c.transfer_syntax)
    }

    pub fn abstract_syntax_for(&self, id: u8) -> Option<&Uid> {
        self.contexts
            .iter()
            .find(|c| c.id == id)
            .map(|c| &c.abstract_syntax)
    }

    /// The first accepted context id whose abstract syntax matches, used
    /// by an SCU picking a context for an outgoing request.
    pub fn context_for_abstract_syntax(&self, abstract_syntax: &Uid) -> Option<u8> {
        self.contexts
            .iter()
            .find(|c| &c.abstract_syntax == abstract_syntax)
            .map(|c| c.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresentationContext> {
        self.contexts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn finds_context_by_abstract_syntax() {
        let mut table = PresentationContextTable::new();
        table.insert(PresentationContext {
            id: 1,
            abstract_syntax: Uid::from_str("1.2.840.10008.1.1").unwrap(),
            transfer_syntax: Uid::from_str("1.2.840.10008.1.2").unwrap(),
        });

        let verification = Uid::from_str("1.2.840.10008.1.1").unwrap();
        assert_eq!(table.context_for_abstract_syntax(&verification), Some(1));
        assert_eq!(
            table.transfer_syntax_for(1).map(|u| u.as_str()),
            Some("1.2.840.10008.1.2")
        );
    }
}
