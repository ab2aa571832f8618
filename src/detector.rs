use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::Result;
use crate::index::FunctionIndex;
use crate::inspector::parse_signature_with_line;
use crate::lexer::squash_whitespace;
use crate::model::{FunctionDefinition, Language, Signature};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultChange {
    pub name: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Parameter-level summary of a signature change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed_defaults: Vec<DefaultChange>,
    /// Parameters present in both signatures appear in a different relative order.
    pub reordered: bool,
}

impl ParameterChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed_defaults.is_empty() && !self.reordered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDiff {
    pub old: FunctionDefinition,
    pub new: FunctionDefinition,
    pub changes: ParameterChanges,
}

impl SignatureDiff {
    pub fn function_name(&self) -> &str {
        self.new.name()
    }
}

pub fn analyze_parameter_changes(old: &Signature, new: &Signature) -> ParameterChanges {
    let old_names: HashSet<&str> = old.parameters.iter().map(|p| p.name.as_str()).collect();
    let new_names: HashSet<&str> = new.parameters.iter().map(|p| p.name.as_str()).collect();

    let added = new
        .parameters
        .iter()
        .filter(|p| !old_names.contains(p.name.as_str()))
        .map(|p| p.name.clone())
        .collect();
    let removed = old
        .parameters
        .iter()
        .filter(|p| !new_names.contains(p.name.as_str()))
        .map(|p| p.name.clone())
        .collect();

    let mut changed_defaults = Vec::new();
    for p in &new.parameters {
        let Some(prev) = old.parameter(&p.name) else { continue };
        let before = prev.default.as_deref().map(squash_whitespace);
        let after = p.default.as_deref().map(squash_whitespace);
        if before != after {
            changed_defaults.push(DefaultChange {
                name: p.name.clone(),
                old: prev.default.clone(),
                new: p.default.clone(),
            });
        }
    }

    let kept_old: Vec<&str> = old
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| new_names.contains(n))
        .collect();
    let kept_new: Vec<&str> = new
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| old_names.contains(n))
        .collect();

    ParameterChanges {
        added,
        removed,
        changed_defaults,
        reordered: kept_old != kept_new,
    }
}

/// Compare `candidate` with the indexed definition of the same name.
///
/// On a change the index is updated so the next comparison uses the new
/// baseline. No prior definition, or structurally equal parameters, is "no change".
pub fn detect_definition(index: &FunctionIndex, candidate: FunctionDefinition) -> Option<SignatureDiff> {
    let name = candidate.name().to_string();
    let Some(old) = index.lookup(&name) else {
        debug!(function = %name, "no indexed definition, nothing to compare");
        return None;
    };
    if old.signature.same_parameters(&candidate.signature) {
        debug!(function = %name, "signature unchanged");
        return None;
    }

    let changes = analyze_parameter_changes(&old.signature, &candidate.signature);
    info!(
        function = %name,
        old = %old.signature.render(),
        new = %candidate.signature.render(),
        "signature changed"
    );
    index.update_definition(&name, candidate.clone());
    Some(SignatureDiff {
        old,
        new: candidate,
        changes,
    })
}

/// Parse `code` as an updated definition living in `file` and diff it against the index.
pub fn detect(index: &FunctionIndex, file: &str, code: &str, language: Language) -> Result<Option<SignatureDiff>> {
    let (signature, fragment_line) = parse_signature_with_line(code, language)?;
    // A fragment does not know where it sits in its file; keep the indexed line when the file matches.
    let line = index
        .lookup(&signature.function_name)
        .filter(|d| d.file == file)
        .map_or(fragment_line, |d| d.line);
    let candidate = FunctionDefinition {
        signature,
        file: file.to_string(),
        line,
    };
    Ok(detect_definition(index, candidate))
}
