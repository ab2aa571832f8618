//! Call-site rewrites for a changed signature.
//!
//! Each usage is bound against the old parameter list (positionally, and by
//! name for Python keyword arguments), then re-emitted in the order of the new
//! list:
//!
//! - a surviving parameter carries its argument to its new position;
//! - a new parameter gets its declared default, or the usage is skipped with
//!   [`TrackError::MissingDefaultForNewParameter`];
//! - an argument for a removed parameter is dropped and reported;
//! - positional arguments beyond the old parameter count are appended.
//!
//! A surviving parameter the usage never supplied stays omitted while it is
//! trailing. When a later position is filled it is written out with its
//! default; without one, JavaScript gets `undefined` and Python switches the
//! rest of the call to keyword arguments.
//!
//! A `*xs` / `...xs` argument is taken to supply every surviving parameter the
//! call did not fill, so it is placed at the first of them. Python writes the
//! parameters after it as keyword arguments; JavaScript leaves new ones to
//! their defaults and cannot express a supplied one there
//! ([`TrackError::ArgumentAfterSpread`]).

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{RemovedArgumentPolicy, SuggestionConfig};
use crate::detector::SignatureDiff;
use crate::error::{ItemError, Result, TrackError};
use crate::lexer::{Lexed, ListItem};
use crate::model::{Language, Parameter, Signature, Suggestion, UsageSite};

#[derive(Debug, Default)]
pub struct SynthesisReport {
    pub suggestions: Vec<Suggestion>,
    /// Rewrites that would drop arguments, held back under [`RemovedArgumentPolicy::Flag`].
    pub needs_review: Vec<Suggestion>,
    /// Usages that could not be rewritten.
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

/// One suggestion per usage of the changed function.
pub fn synthesize(diff: &SignatureDiff, usages: &[UsageSite], opts: &SuggestionConfig) -> SynthesisReport {
    let mut report = SynthesisReport::default();
    for usage in usages {
        if opts.skip_same_file_usages && usage.file == diff.new.file {
            debug!(file = %usage.file, line = usage.line, "same-file usage skipped");
            continue;
        }
        match rewrite_usage(diff, usage) {
            Ok(s) if !s.dropped_arguments.is_empty() && opts.removed_arguments == RemovedArgumentPolicy::Flag => {
                report.needs_review.push(s)
            }
            Ok(s) => report.suggestions.push(s),
            Err(err) => {
                warn!(file = %usage.file, line = usage.line, "{err}");
                report.skipped += 1;
                report.errors.push(ItemError::new(&usage.file, Some(usage.line), &err));
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Parameters that can receive an argument, split by how they bind.
struct Bindable<'a> {
    positional: Vec<&'a Parameter>,
    /// Python parameters after `*` or `*args`.
    keyword_only: Vec<&'a Parameter>,
}

impl Bindable<'_> {
    fn contains(&self, name: &str) -> bool {
        self.positional.iter().chain(&self.keyword_only).any(|p| p.name == name)
    }
}

fn bindable(sig: &Signature, member_call: bool) -> Bindable<'_> {
    let mut params = sig.parameters.as_slice();
    if sig.language.is_python() && member_call {
        if let Some(first) = params.first() {
            if first.name == "self" || first.name == "cls" {
                params = &params[1..];
            }
        }
    }

    let mut out = Bindable {
        positional: Vec::new(),
        keyword_only: Vec::new(),
    };
    let mut keyword_only = false;
    for p in params {
        if p.is_keyword_variadic() || p.name == "/" {
            continue;
        }
        if p.is_separator() || p.is_variadic() {
            keyword_only = sig.language.is_python();
            continue;
        }
        if keyword_only {
            out.keyword_only.push(p);
        } else {
            out.positional.push(p);
        }
    }
    out
}

enum Argument<'a> {
    Positional(&'a str),
    /// `*xs` or `...xs`.
    Spread(&'a str),
    Keyword { name: String, value: String, raw: &'a str },
    /// `**opts`.
    KeywordSpread(&'a str),
}

fn classify(arg: &str, language: Language) -> Argument<'_> {
    if language.is_python() {
        if arg.starts_with("**") {
            return Argument::KeywordSpread(arg);
        }
        if arg.starts_with('*') {
            return Argument::Spread(arg);
        }
        let item = ListItem {
            code: arg.to_string(),
            masked: Lexed::new(arg, language).masked,
        };
        if let Some((name, value)) = item.keyword_argument() {
            return Argument::Keyword { name, value, raw: arg };
        }
    } else if arg.starts_with("...") {
        return Argument::Spread(arg);
    }
    Argument::Positional(arg)
}

enum Slot {
    Given(String),
    Keyword(String),
    /// Surviving parameter the usage did not supply, with its new default.
    Unsupplied(Option<String>),
    /// New parameter filled with its default.
    Inserted(String),
}

impl Slot {
    fn forces_position(&self) -> bool {
        matches!(self, Slot::Given(_) | Slot::Inserted(_))
    }
}

/// Rewrite one call site against `diff`.
pub fn rewrite_usage(diff: &SignatureDiff, usage: &UsageSite) -> Result<Suggestion> {
    let old_sig = &diff.old.signature;
    let new_sig = &diff.new.signature;
    let language = new_sig.language;
    let function = new_sig.function_name.as_str();

    let old = bindable(old_sig, usage.member_call);
    let new = bindable(new_sig, usage.member_call);

    let mut positional: Vec<&str> = Vec::new();
    let mut tail: Vec<&str> = Vec::new();
    let mut keywords: Vec<(String, String, &str)> = Vec::new();
    let mut keyword_spreads: Vec<&str> = Vec::new();
    for arg in &usage.arguments {
        match classify(arg, language) {
            Argument::Positional(t) if tail.is_empty() => positional.push(t),
            Argument::Positional(t) | Argument::Spread(t) => tail.push(t),
            Argument::Keyword { name, value, raw } => keywords.push((name, value, raw)),
            Argument::KeywordSpread(t) => keyword_spreads.push(t),
        }
    }

    let mut dropped: Vec<String> = Vec::new();

    let mut by_position: HashMap<&str, &str> = HashMap::new();
    for (p, arg) in old.positional.iter().zip(&positional) {
        if new.contains(&p.name) {
            by_position.insert(p.name.as_str(), *arg);
        } else {
            dropped.push(arg.to_string());
        }
    }
    let excess = positional.iter().skip(old.positional.len()).chain(&tail);

    let mut by_keyword: HashMap<&str, &str> = HashMap::new();
    let mut unknown_keywords: Vec<&str> = Vec::new();
    for (name, value, raw) in &keywords {
        if new.contains(name) {
            by_keyword.insert(name.as_str(), value.as_str());
        } else if old.contains(name) {
            dropped.push(raw.to_string());
        } else {
            unknown_keywords.push(*raw);
        }
    }

    let missing = |p: &Parameter| TrackError::MissingDefaultForNewParameter {
        function: function.to_string(),
        parameter: p.name.clone(),
    };

    let mut slots = Vec::with_capacity(new.positional.len());
    for p in &new.positional {
        let name = p.name.as_str();
        let slot = if let Some(arg) = by_position.get(name) {
            Slot::Given(arg.to_string())
        } else if let Some(value) = by_keyword.get(name) {
            Slot::Keyword(value.to_string())
        } else if old_sig.parameter(name).is_some() {
            Slot::Unsupplied(p.default.clone())
        } else {
            Slot::Inserted(p.default.clone().ok_or_else(|| missing(*p))?)
        };
        slots.push(slot);
    }

    // A spread feeds the first parameter the call left unsupplied and every
    // one after it, so positional output stops there.
    let spread_at = if tail.is_empty() {
        None
    } else {
        slots.iter().position(|s| matches!(s, Slot::Unsupplied(_)))
    };
    let aligned = spread_at.unwrap_or(slots.len());

    let last_forced = slots[..aligned].iter().rposition(Slot::forces_position);
    let mut keyword_mode = false;
    let mut args: Vec<String> = Vec::new();
    for (j, (p, slot)) in new.positional.iter().zip(&slots[..aligned]).enumerate() {
        let value = match slot {
            Slot::Given(v) | Slot::Inserted(v) => v.clone(),
            Slot::Keyword(v) => {
                keyword_mode = true;
                v.clone()
            }
            Slot::Unsupplied(_) if keyword_mode || last_forced.map_or(true, |last| j > last) => continue,
            Slot::Unsupplied(Some(default)) => default.clone(),
            Slot::Unsupplied(None) if language.is_python() => {
                keyword_mode = true;
                continue;
            }
            Slot::Unsupplied(None) => "undefined".to_string(),
        };
        if keyword_mode {
            args.push(format!("{}={value}", p.name));
        } else {
            args.push(value);
        }
    }

    args.extend(excess.map(|a| a.to_string()));

    for (p, slot) in new.positional.iter().zip(&slots).skip(aligned) {
        match slot {
            Slot::Unsupplied(_) => continue,
            Slot::Given(v) | Slot::Keyword(v) | Slot::Inserted(v) if language.is_python() => {
                args.push(format!("{}={v}", p.name))
            }
            // Left to its default when the spread runs short.
            Slot::Inserted(_) => continue,
            Slot::Given(_) | Slot::Keyword(_) => {
                return Err(TrackError::ArgumentAfterSpread {
                    function: function.to_string(),
                    parameter: p.name.clone(),
                })
            }
        }
    }

    for p in &new.keyword_only {
        let name = p.name.as_str();
        let value = match (by_position.get(name), by_keyword.get(name)) {
            (Some(v), _) | (None, Some(v)) => v.to_string(),
            (None, None) if old_sig.parameter(name).is_some() => continue,
            (None, None) => p.default.clone().ok_or_else(|| missing(*p))?,
        };
        args.push(format!("{name}={value}"));
    }

    args.extend(unknown_keywords.iter().map(|a| a.to_string()));
    args.extend(keyword_spreads.iter().map(|a| a.to_string()));

    let callee = usage
        .call_text
        .find('(')
        .map_or(usage.function_name.as_str(), |open| &usage.call_text[..open]);
    Ok(Suggestion {
        function_name: function.to_string(),
        file: usage.file.clone(),
        line: usage.line,
        old_code: usage.call_text.clone(),
        new_code: format!("{callee}({})", args.join(", ")),
        dropped_arguments: dropped,
    })
}
