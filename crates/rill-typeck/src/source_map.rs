//! Provenance tracking for inferred types.

use rill_common::Span;
use rustc_hash::FxHashSet;
use serde::Serialize;

/// One place a type was observed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeSource {
    pub document: String,
    pub span: Span,
}

/// Deduplicated set of observation sites a type accumulated across
/// assignments and merges.
#[derive(Clone, Debug, Default)]
pub struct SourceMap {
    entries: FxHashSet<TypeSource>,
}

impl SourceMap {
    pub fn add(&mut self, document: &str, span: Span) {
        self.entries.insert(TypeSource {
            document: document.to_string(),
            span,
        });
    }

    pub fn extend(&mut self, other: &SourceMap) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All sources in a stable order.
    pub fn all(&self) -> Vec<TypeSource> {
        let mut sources: Vec<_> = self.entries.iter().cloned().collect();
        sources.sort();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_common::Span;

    #[test]
    fn identical_sites_collapse() {
        let mut map = SourceMap::default();
        map.add("main", Span::on_line(1, 0, 4));
        map.add("main", Span::on_line(1, 0, 4));
        map.add("main", Span::on_line(2, 0, 4));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn extend_keeps_both_documents() {
        let mut a = SourceMap::default();
        a.add("main", Span::on_line(1, 0, 4));
        let mut b = SourceMap::default();
        b.add("lib", Span::on_line(1, 0, 4));
        a.extend(&b);
        let all = a.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].document, "lib");
    }
}
