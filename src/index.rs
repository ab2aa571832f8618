use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::{FunctionDefinition, UsageSite};

/// One complete, immutable view of the index.
#[derive(Debug, Clone, Default)]
struct IndexSnapshot {
    definitions: BTreeMap<String, FunctionDefinition>,
    /// Per name, in scan order.
    usages: BTreeMap<String, Vec<UsageSite>>,
}

/// Name-keyed index of definitions and their call sites.
///
/// Readers always see a whole snapshot: [`FunctionIndex::rebuild`] builds the
/// new maps off to the side and swaps them in with a single store.
#[derive(Debug, Default)]
pub struct FunctionIndex {
    current: ArcSwap<IndexSnapshot>,
}

impl FunctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything. A later definition of the same name wins.
    pub fn rebuild(&self, definitions: Vec<FunctionDefinition>, usages: Vec<UsageSite>) {
        let mut next = IndexSnapshot::default();
        for def in definitions {
            next.definitions.insert(def.name().to_string(), def);
        }
        for usage in usages {
            next.usages.entry(usage.function_name.clone()).or_default().push(usage);
        }
        self.current.store(Arc::new(next));
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionDefinition> {
        self.current.load().definitions.get(name).cloned()
    }

    pub fn usages_of(&self, name: &str) -> Vec<UsageSite> {
        self.current.load().usages.get(name).cloned().unwrap_or_default()
    }

    /// Replace a single definition; its usages are left untouched.
    pub fn update_definition(&self, name: &str, definition: FunctionDefinition) {
        self.current.rcu(|snap| {
            let mut next = IndexSnapshot::clone(snap);
            next.definitions.insert(name.to_string(), definition.clone());
            next
        });
    }

    /// All definitions, ordered by name.
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.current.load().definitions.values().cloned().collect()
    }

    /// All usages, grouped by name (ordered) and in scan order within a name.
    pub fn usages(&self) -> Vec<UsageSite> {
        self.current.load().usages.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.current.load().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Language, Signature};

    fn def(name: &str, file: &str, line: usize) -> FunctionDefinition {
        FunctionDefinition {
            signature: Signature {
                function_name: name.to_string(),
                parameters: vec![],
                language: Language::Python,
            },
            file: file.to_string(),
            line,
        }
    }

    fn usage(name: &str, line: usize) -> UsageSite {
        UsageSite {
            function_name: name.to_string(),
            file: "use.py".to_string(),
            line,
            column: 1,
            call_text: format!("{name}()"),
            arguments: vec![],
            member_call: false,
        }
    }

    #[test]
    fn rebuild_lookup_and_usages() {
        let index = FunctionIndex::new();
        assert!(index.is_empty());
        assert!(index.lookup("f").is_none());
        assert!(index.usages_of("f").is_empty());

        index.rebuild(vec![def("f", "a.py", 1), def("g", "a.py", 5)], vec![usage("f", 3), usage("f", 9)]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("g").unwrap().line, 5);
        let lines: Vec<usize> = index.usages_of("f").iter().map(|u| u.line).collect();
        assert_eq!(lines, vec![3, 9]);
        assert!(index.usages_of("g").is_empty());
    }

    #[test]
    fn later_definition_overwrites_earlier() {
        let index = FunctionIndex::new();
        index.rebuild(vec![def("f", "a.py", 1), def("f", "b.py", 2)], vec![]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("f").unwrap().file, "b.py");
    }

    #[test]
    fn rebuild_clears_previous_contents() {
        let index = FunctionIndex::new();
        index.rebuild(vec![def("f", "a.py", 1)], vec![usage("f", 3)]);
        index.rebuild(vec![def("g", "a.py", 1)], vec![]);
        assert!(index.lookup("f").is_none());
        assert!(index.usages_of("f").is_empty());
    }

    #[test]
    fn update_definition_keeps_usages() {
        let index = FunctionIndex::new();
        index.rebuild(vec![def("f", "a.py", 1)], vec![usage("f", 3)]);
        index.update_definition("f", def("f", "a.py", 7));
        assert_eq!(index.lookup("f").unwrap().line, 7);
        assert_eq!(index.usages_of("f").len(), 1);
    }

    #[test]
    fn flat_accessors() {
        let index = FunctionIndex::new();
        index.rebuild(
            vec![def("g", "a.py", 5), def("f", "a.py", 1)],
            vec![usage("g", 2), usage("f", 3), usage("g", 1)],
        );
        let names: Vec<String> = index.definitions().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["f", "g"]);
        let usages: Vec<(String, usize)> = index
            .usages()
            .into_iter()
            .map(|u| (u.function_name, u.line))
            .collect();
        assert_eq!(
            usages,
            vec![("f".to_string(), 3), ("g".to_string(), 2), ("g".to_string(), 1)]
        );
    }
}
