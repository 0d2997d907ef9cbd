//! Textual three-way merge of blob content (§4.4 case 4), built on `diffy`.

use diffy::{ConflictStyle, MergeOptions};

/// The outcome of merging one blob's content across base/ours/theirs.
pub struct MergeResult {
    /// The merged content — clean, or containing embedded conflict markers.
    pub content: Vec<u8>,
    /// Whether the merge left conflict markers in `content`.
    pub has_conflicts: bool,
}

/// Three-way merge `ours` and `theirs` against `base`.
///
/// Binary content (anything that isn't valid UTF-8 on all three sides)
/// cannot be merged textually; it is reported as a conflict retaining our
/// side's bytes verbatim. `markers` relabels `diffy`'s own
/// `<<<<<<</|||||||/=======/>>>>>>>` section headers (`[base, ours, theirs]`)
/// when a conflict survives; if `diffy`'s default wording ever changes, this
/// is a best-effort substitution and simply leaves its markers untouched.
pub(crate) fn merge_blobs(base: &[u8], ours: &[u8], theirs: &[u8], markers: &[String; 3]) -> MergeResult {
    let (Ok(base_text), Ok(our_text), Ok(their_text)) = (
        std::str::from_utf8(base),
        std::str::from_utf8(ours),
        std::str::from_utf8(theirs),
    ) else {
        return MergeResult {
            content: ours.to_vec(),
            has_conflicts: true,
        };
    };

    let options = MergeOptions::new().set_conflict_style(ConflictStyle::Diff3);
    match options.merge(base_text, our_text, their_text) {
        Ok(merged) => MergeResult {
            content: merged.into_bytes(),
            has_conflicts: false,
        },
        Err(conflicted) => MergeResult {
            content: relabel_markers(&conflicted, markers).into_bytes(),
            has_conflicts: true,
        },
    }
}

fn relabel_markers(text: &str, markers: &[String; 3]) -> String {
    let [base, ours, theirs] = markers;
    let relabeled: Vec<String> = text
        .lines()
        .map(|line| {
            if let Some(rest) = line.strip_prefix("<<<<<<< ") {
                format!("<<<<<<< {ours}{}", suffix_after_label(rest))
            } else if let Some(rest) = line.strip_prefix("||||||| ") {
                format!("||||||| {base}{}", suffix_after_label(rest))
            } else if let Some(rest) = line.strip_prefix(">>>>>>> ") {
                format!(">>>>>>> {theirs}{}", suffix_after_label(rest))
            } else {
                line.to_owned()
            }
        })
        .collect();
    let mut out = relabeled.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn suffix_after_label(rest: &str) -> &str {
    rest.find(' ').map_or("", |idx| &rest[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> [String; 3] {
        ["BASE".to_owned(), "OURS".to_owned(), "THEIRS".to_owned()]
    }

    #[test]
    fn non_overlapping_edits_merge_cleanly() {
        let base = b"one\ntwo\nthree\n";
        let ours = b"one changed\ntwo\nthree\n";
        let theirs = b"one\ntwo\nthree changed\n";
        let result = merge_blobs(base, ours, theirs, &markers());
        assert!(!result.has_conflicts);
        let text = String::from_utf8(result.content).unwrap();
        assert!(text.contains("one changed"));
        assert!(text.contains("three changed"));
    }

    #[test]
    fn overlapping_edits_conflict() {
        let base = b"line\n";
        let ours = b"ours-line\n";
        let theirs = b"theirs-line\n";
        let result = merge_blobs(base, ours, theirs, &markers());
        assert!(result.has_conflicts);
        let text = String::from_utf8(result.content).unwrap();
        assert!(text.contains("ours-line"));
        assert!(text.contains("theirs-line"));
    }

    #[test]
    fn binary_content_is_a_conflict() {
        let base = [0xff, 0x00, 0xfe];
        let ours = [0xff, 0x01, 0xfe];
        let theirs = [0xff, 0x02, 0xfe];
        let result = merge_blobs(&base, &ours, &theirs, &markers());
        assert!(result.has_conflicts);
        assert_eq!(result.content, ours);
    }

    #[test]
    fn relabel_substitutes_configured_marker_text() {
        let diffy_style = "<<<<<<< ours\nmine\n||||||| original\nbase\n=======\ntheirs\n>>>>>>> theirs\n";
        let relabeled = relabel_markers(diffy_style, &markers());
        assert!(relabeled.contains("<<<<<<< OURS"));
        assert!(relabeled.contains("||||||| BASE"));
        assert!(relabeled.contains(">>>>>>> THEIRS"));
    }
}
