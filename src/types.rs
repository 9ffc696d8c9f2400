//! Core domain types shared by the composition and linking engine.

use serde::{Deserialize, Serialize};

/// One structured-form answer. Untagged so a session file stores plain JSON
/// values: `true`, `3`, `"3 days"`, `["cough", "fever"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Toggle answer. `false` counts as "not answered".
    Flag(bool),
    /// Multi-select answer, kept in selection order.
    List(Vec<String>),
    /// Numeric answer.
    Number(f64),
    /// Free text or single-select answer.
    Text(String),
}

impl FieldValue {
    /// Stringified form used by visibility comparisons. Lists join with a
    /// bare comma, the way the form layer stringifies arrays.
    pub fn comparison_text(&self) -> String {
        return match self {
            FieldValue::Flag(flag) => flag.to_string(),
            FieldValue::List(items) => items.join(","),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(text) => text.clone(),
        };
    }

    /// Text emitted into a composed note line.
    pub fn display(&self) -> String {
        return match self {
            FieldValue::List(items) => items.join(", "),
            other => other.comparison_text(),
        };
    }

    /// Whether this answer is worth writing into the note.
    /// Blank text, `false` and empty lists are treated as unanswered.
    pub fn is_meaningful(&self) -> bool {
        return match self {
            FieldValue::Flag(flag) => *flag,
            FieldValue::List(items) => !items.is_empty(),
            FieldValue::Number(_) => true,
            FieldValue::Text(text) => !text.trim().is_empty(),
        };
    }

    /// Infer a value from command-line words: several words become a list,
    /// `true`/`false` a flag, anything numeric a number, everything else text.
    pub fn infer(words: &[String]) -> Self {
        if let [single] = words {
            if let Ok(flag) = single.parse::<bool>() {
                return FieldValue::Flag(flag);
            }
            if let Ok(n) = single.parse::<f64>()
                && n.is_finite()
            {
                return FieldValue::Number(n);
            }
            return FieldValue::Text(single.clone());
        }
        return FieldValue::List(words.to_vec());
    }
}

/// Relationship between a composed section and the free-text note.
/// The serialized names are part of the contract with the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Anchored block is present and unedited.
    LinkedClean,
    /// Anchored block can no longer be found in the note.
    LinkedMissing,
    /// Anchored block was edited by hand after insertion.
    LinkedModified,
    /// Section was never inserted (or its anchor was removed).
    NotLinked,
}

impl LinkState {
    /// User-facing label. Other components match on these strings.
    pub const fn label(self) -> &'static str {
        return match self {
            LinkState::LinkedClean => "Linked",
            LinkState::LinkedMissing => "Link missing",
            LinkState::LinkedModified => "Modified after insert",
            LinkState::NotLinked => "Not inserted",
        };
    }

    /// Stable machine name, identical to the serialized form.
    pub const fn name(self) -> &'static str {
        return match self {
            LinkState::LinkedClean => "linked_clean",
            LinkState::LinkedMissing => "linked_missing",
            LinkState::LinkedModified => "linked_modified",
            LinkState::NotLinked => "not_linked",
        };
    }

    /// Display tone paired with the label.
    pub const fn tone(self) -> Tone {
        return match self {
            LinkState::LinkedClean => Tone::Success,
            LinkState::LinkedMissing => Tone::Danger,
            LinkState::LinkedModified => Tone::Warning,
            LinkState::NotLinked => Tone::Neutral,
        };
    }
}

/// A cursor or selection inside the note, as byte offsets.
/// `start <= end` always holds after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Exclusive end offset.
    pub end: usize,
    /// Inclusive start offset.
    pub start: usize,
}

impl Selection {
    /// Collapsed selection at a single offset.
    pub const fn cursor(pos: usize) -> Self {
        return Self { end: pos, start: pos };
    }

    /// Build a selection, swapping the ends if given backwards.
    pub fn new(start: usize, end: usize) -> Self {
        return Self { end: start.max(end), start: start.min(end) };
    }

    /// Clamp both ends into `text` and snap them back onto UTF-8 boundaries
    /// so slicing can never split a character.
    pub fn clamp_to(self, text: &str) -> Self {
        return Self::new(floor_char_boundary(text, self.start), floor_char_boundary(text, self.end));
    }
}

/// Badge colour family for a link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Something the user should act on.
    Danger,
    /// Nothing to report.
    Neutral,
    /// Healthy.
    Success,
    /// Worth a look.
    Warning,
}

impl Tone {
    /// Lowercase name used in CLI output.
    pub const fn name(self) -> &'static str {
        return match self {
            Tone::Danger => "danger",
            Tone::Neutral => "neutral",
            Tone::Success => "success",
            Tone::Warning => "warning",
        };
    }
}

/// Largest char boundary in `text` that is `<= index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut idx = index.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    return idx;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_values_display_with_comma_space() {
        let value = FieldValue::List(vec!["cough".to_string(), "fever".to_string()]);
        assert_eq!(value.display(), "cough, fever");
        assert_eq!(value.comparison_text(), "cough,fever");
    }

    #[test]
    fn false_and_blank_are_not_meaningful() {
        assert!(!FieldValue::Flag(false).is_meaningful());
        assert!(!FieldValue::Text("   ".to_string()).is_meaningful());
        assert!(!FieldValue::List(vec![]).is_meaningful());
        assert!(FieldValue::Number(0.0).is_meaningful());
    }

    #[test]
    fn whole_numbers_display_without_fraction() {
        assert_eq!(FieldValue::Number(3.0).display(), "3");
        assert_eq!(FieldValue::Number(37.5).display(), "37.5");
    }

    #[test]
    fn infer_picks_flag_number_text_and_list() {
        assert_eq!(FieldValue::infer(&["true".to_string()]), FieldValue::Flag(true));
        assert_eq!(FieldValue::infer(&["38".to_string()]), FieldValue::Number(38.0));
        assert_eq!(FieldValue::infer(&["3 days".to_string()]), FieldValue::Text("3 days".to_string()));
        assert_eq!(
            FieldValue::infer(&["a".to_string(), "b".to_string()]),
            FieldValue::List(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn selection_snaps_to_char_boundaries() {
        let text = "añb";
        let sel = Selection::new(2, 99).clamp_to(text);
        assert_eq!(sel, Selection::new(1, 4));
    }

    #[test]
    fn link_state_labels_are_stable() {
        assert_eq!(LinkState::NotLinked.label(), "Not inserted");
        assert_eq!(LinkState::LinkedClean.label(), "Linked");
        assert_eq!(LinkState::LinkedModified.label(), "Modified after insert");
        assert_eq!(LinkState::LinkedMissing.label(), "Link missing");
    }
}
