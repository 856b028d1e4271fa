//! Span-based surgical edits to schematic source text.
//!
//! A [`PatchSet`] collects byte-span replacements against one source string
//! and applies them in a single forward pass. This is how net renames reach
//! disk without re-emitting the file: only the quoted names change, every
//! other byte (layout, wire routing, comments) survives untouched.

use crate::{Span, format};

/// One span replacement against a source string.
#[derive(Debug, Clone)]
pub struct Patch {
    pub span: Span,
    /// Replacement text, quoting included.
    pub text: String,
}

/// An accumulated set of replacements.
#[derive(Debug, Default)]
pub struct PatchSet {
    patches: Vec<Patch>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a quoted string value. `new_value` is the bare string; quoting
    /// and escaping happen here.
    pub fn replace_string(&mut self, span: Span, new_value: &str) {
        self.patches.push(Patch {
            span,
            text: format::quote_string(new_value),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Splice every patch into `source`, ordered by offset. Bytes outside the
    /// patched spans pass through untouched, whatever they contain.
    pub fn apply_to_string(&self, source: &str) -> String {
        if self.patches.is_empty() {
            return source.to_string();
        }

        let mut ordered: Vec<&Patch> = self.patches.iter().collect();
        ordered.sort_by_key(|patch| patch.span.start);

        // Spans must be in bounds and non-overlapping once ordered.
        debug_assert!(ordered.last().is_none_or(|p| p.span.end <= source.len()));
        debug_assert!(
            ordered
                .windows(2)
                .all(|pair| pair[0].span.end <= pair[1].span.start)
        );

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0usize;
        for patch in ordered {
            out.push_str(&source[cursor..patch.span.start]);
            out.push_str(&patch.text);
            cursor = patch.span.end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SexpKind, parse};

    #[test]
    fn patch_replaces_net_name_in_place() {
        let source = "(schsync_sch\n\t(label \"VCC\"\n\t\t(anchor \"R1\" \"1\")\n\t)\n)\n";
        let doc = parse(source).unwrap();

        let mut patches = PatchSet::new();
        doc.walk_strings(|value, span, ctx| {
            if value == "VCC" && ctx.parent_tag() == Some("label") {
                patches.replace_string(span, "VCC_3V3");
            }
        });

        assert_eq!(patches.len(), 1);
        let patched = patches.apply_to_string(source);
        assert_eq!(
            patched,
            "(schsync_sch\n\t(label \"VCC_3V3\"\n\t\t(anchor \"R1\" \"1\")\n\t)\n)\n"
        );
    }

    #[test]
    fn patch_preserves_untouched_bytes() {
        // Odd spacing and a comment must survive a rename untouched.
        let source = "(schsync_sch  ; hand-edited\n  (label \"OLD\")\n  (wire (pts (xy 1 2)  (xy 3 4))))";
        let doc = parse(source).unwrap();

        let mut patches = PatchSet::new();
        doc.walk_strings(|value, span, _ctx| {
            if value == "OLD" {
                patches.replace_string(span, "NEW");
            }
        });

        let patched = patches.apply_to_string(source);
        assert!(patched.contains("; hand-edited"));
        assert!(patched.contains("(xy 1 2)  (xy 3 4)"));
        assert!(patched.contains("\"NEW\""));
        assert!(!patched.contains("\"OLD\""));
    }

    #[test]
    fn patch_escapes_replacement_strings() {
        let source = "(label \"A\")";
        let doc = parse(source).unwrap();
        let span = doc.as_list().unwrap()[1].span;

        let mut patches = PatchSet::new();
        patches.replace_string(span, "has \"quotes\"");
        assert_eq!(
            patches.apply_to_string(source),
            "(label \"has \\\"quotes\\\"\")"
        );
    }

    #[test]
    fn empty_patch_set_is_identity() {
        let source = "(schsync_sch (label \"VCC\"))";
        let patches = PatchSet::new();
        assert!(patches.is_empty());
        assert_eq!(patches.apply_to_string(source), source);
    }

    #[test]
    fn multiple_patches_apply_in_offset_order() {
        let source = "(net \"A\") (net \"B\")";
        // Two top-level nodes: parse each half separately for spans.
        let first = parse("(net \"A\")").unwrap();
        let a_span = first.as_list().unwrap()[1].span;

        let mut patches = PatchSet::new();
        // Patch "B" (later offset) before "A" to exercise sorting.
        patches.replace_string(Span::new(15, 18), "B2");
        patches.replace_string(a_span, "A2");

        assert_eq!(patches.apply_to_string(source), "(net \"A2\") (net \"B2\")");
    }

    #[test]
    fn patched_text_reparses() {
        let source = "(schsync_sch (label \"GND\" (at 12.7 25.4 0)))";
        let doc = parse(source).unwrap();

        let mut patches = PatchSet::new();
        doc.walk_strings(|value, span, _| {
            if value == "GND" {
                patches.replace_string(span, "AGND");
            }
        });

        let patched = patches.apply_to_string(source);
        let reparsed = parse(&patched).unwrap();
        let label = reparsed.find_child("label").unwrap();
        assert_eq!(label[1].kind, SexpKind::Str("AGND".to_string()));
    }
}
