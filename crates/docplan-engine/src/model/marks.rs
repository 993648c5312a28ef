use serde::{Deserialize, Serialize};

/// Visible character formatting carried by a text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Formatting {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Formatting {
    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Self::default()
        }
    }

    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Self::default()
        }
    }
}

/// The boolean attributes reported in style summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoreAttribute {
    Bold,
    Italic,
    Underline,
    Strike,
}

impl CoreAttribute {
    pub const ALL: [CoreAttribute; 4] = [
        CoreAttribute::Bold,
        CoreAttribute::Italic,
        CoreAttribute::Underline,
        CoreAttribute::Strike,
    ];

    pub fn get(self, formatting: &Formatting) -> bool {
        match self {
            CoreAttribute::Bold => formatting.bold,
            CoreAttribute::Italic => formatting.italic,
            CoreAttribute::Underline => formatting.underline,
            CoreAttribute::Strike => formatting.strike,
        }
    }

    pub fn set(self, formatting: &mut Formatting, value: bool) {
        match self {
            CoreAttribute::Bold => formatting.bold = value,
            CoreAttribute::Italic => formatting.italic = value,
            CoreAttribute::Underline => formatting.underline = value,
            CoreAttribute::Strike => formatting.strike = value,
        }
    }
}

/// A partial formatting update. `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InlinePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl InlinePatch {
    pub fn is_empty(&self) -> bool {
        self.bold.is_none()
            && self.italic.is_none()
            && self.underline.is_none()
            && self.strike.is_none()
            && self.color.is_none()
    }

    fn core_value(&self, attribute: CoreAttribute) -> Option<bool> {
        match attribute {
            CoreAttribute::Bold => self.bold,
            CoreAttribute::Italic => self.italic,
            CoreAttribute::Underline => self.underline,
            CoreAttribute::Strike => self.strike,
        }
    }

    pub fn apply(&self, formatting: &Formatting) -> Formatting {
        let mut next = formatting.clone();
        for attribute in CoreAttribute::ALL {
            if let Some(value) = self.core_value(attribute) {
                attribute.set(&mut next, value);
            }
        }
        if let Some(color) = &self.color {
            next.color = Some(color.clone());
        }
        next
    }

    /// True when applying the patch would leave `formatting` unchanged.
    pub fn is_satisfied_by(&self, formatting: &Formatting) -> bool {
        self.apply(formatting) == *formatting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackedKind {
    Insert,
    Delete,
    Format,
}

/// A raw tracked-edit mark as stored on a text run.
///
/// Several runs may carry marks with the same `id`; they form one logical change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedMark {
    pub kind: TrackedKind,
    pub id: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    pub date: String,
    /// Formatting before a tracked format change, restored on reject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Formatting>,
}

/// Everything attached to a text run besides its characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkSet {
    pub formatting: Formatting,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracked: Vec<TrackedMark>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

impl MarkSet {
    pub fn with_formatting(formatting: Formatting) -> Self {
        Self {
            formatting,
            ..Self::default()
        }
    }

    pub fn has_tracked(&self, kind: TrackedKind) -> bool {
        self.tracked.iter().any(|mark| mark.kind == kind)
    }

    pub fn tracked_with_id(&self, id: &str) -> Option<&TrackedMark> {
        self.tracked.iter().find(|mark| mark.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_patch_only_touches_named_attributes() {
        let patch = InlinePatch {
            bold: Some(true),
            strike: Some(false),
            ..InlinePatch::default()
        };
        let before = Formatting {
            italic: true,
            strike: true,
            ..Formatting::default()
        };

        let after = patch.apply(&before);

        assert_eq!(
            after,
            Formatting {
                bold: true,
                italic: true,
                ..Formatting::default()
            }
        );
        assert!(!patch.is_satisfied_by(&before));
        assert!(patch.is_satisfied_by(&after));
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result: Result<InlinePatch, _> =
            serde_json::from_str(r#"{ "bold": true, "blink": true }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_patch() {
        assert!(InlinePatch::default().is_empty());
        assert!(
            !InlinePatch {
                color: Some("FF0000".into()),
                ..InlinePatch::default()
            }
            .is_empty()
        );
    }
}
