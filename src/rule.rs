//! Built-in rule catalog

use crate::violation::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a built-in accessibility check
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    FormLabels,
    ImageAlt,
    InteractiveElements,
    HeadingHierarchy,
    DialogFocus,
    LandmarkPresence,
    FormErrors,
    TableHeaders,
    DuplicateIds,
    SkipLink,
    ColorContrast,
}

impl RuleId {
    /// Every rule, in execution order
    pub const ALL: [RuleId; 11] = [
        RuleId::FormLabels,
        RuleId::ImageAlt,
        RuleId::InteractiveElements,
        RuleId::HeadingHierarchy,
        RuleId::DialogFocus,
        RuleId::LandmarkPresence,
        RuleId::FormErrors,
        RuleId::TableHeaders,
        RuleId::DuplicateIds,
        RuleId::SkipLink,
        RuleId::ColorContrast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::FormLabels => "form-labels",
            RuleId::ImageAlt => "image-alt",
            RuleId::InteractiveElements => "interactive-elements",
            RuleId::HeadingHierarchy => "heading-hierarchy",
            RuleId::DialogFocus => "dialog-focus",
            RuleId::LandmarkPresence => "landmark-presence",
            RuleId::FormErrors => "form-errors",
            RuleId::TableHeaders => "table-headers",
            RuleId::DuplicateIds => "duplicate-ids",
            RuleId::SkipLink => "skip-link",
            RuleId::ColorContrast => "color-contrast",
        }
    }

    /// WCAG 2.x success criterion the rule maps to
    pub fn wcag(&self) -> &'static str {
        match self {
            RuleId::FormLabels => "3.3.2",
            RuleId::ImageAlt => "1.1.1",
            RuleId::InteractiveElements => "4.1.2",
            RuleId::HeadingHierarchy => "1.3.1",
            RuleId::DialogFocus => "2.1.1",
            RuleId::LandmarkPresence => "1.3.1",
            RuleId::FormErrors => "3.3.1",
            RuleId::TableHeaders => "1.3.1",
            RuleId::DuplicateIds => "4.1.1",
            RuleId::SkipLink => "2.4.1",
            RuleId::ColorContrast => "1.4.3",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            RuleId::SkipLink | RuleId::ColorContrast => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RuleId::FormLabels => "Form controls must have an accessible label",
            RuleId::ImageAlt => "Images must have an alt attribute",
            RuleId::InteractiveElements => "Links and buttons must have an accessible name",
            RuleId::HeadingHierarchy => "Pages have one h1 and heading levels do not skip",
            RuleId::DialogFocus => "Dialogs must contain a focusable element",
            RuleId::LandmarkPresence => "Pages must have a main landmark",
            RuleId::FormErrors => "Invalid fields must be marked and described",
            RuleId::TableHeaders => "Data tables must have header cells",
            RuleId::DuplicateIds => "Element ids must be unique within a page",
            RuleId::SkipLink => "Pages should offer a skip-to-content link",
            RuleId::ColorContrast => "Text must have sufficient color contrast",
        }
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            RuleId::FormLabels => {
                "Add a <label for=\"...\"> matching the control's id, wrap the control in a \
                 label, or set aria-label/aria-labelledby"
            }
            RuleId::ImageAlt => {
                "Add alt text describing the image, or alt=\"\" if it is purely decorative"
            }
            RuleId::InteractiveElements => {
                "Give the element visible text, an aria-label, or an image with alt text"
            }
            RuleId::HeadingHierarchy => {
                "Use exactly one <h1> per page and increase heading levels one step at a time"
            }
            RuleId::DialogFocus => "Put at least one focusable control inside the dialog",
            RuleId::LandmarkPresence => "Wrap the primary content in <main> or role=\"main\"",
            RuleId::FormErrors => {
                "Set aria-invalid=\"true\" and link the error message with aria-describedby"
            }
            RuleId::TableHeaders => "Add <th> cells with an appropriate scope attribute",
            RuleId::DuplicateIds => "Give every element a unique id",
            RuleId::SkipLink => "Add a link to the main content as the first focusable element",
            RuleId::ColorContrast => "Use a contrast ratio of at least 4.5:1 for normal text",
        }
    }

    /// Checks that need computed styles or rendered layout
    pub fn is_placeholder(&self) -> bool {
        matches!(self, RuleId::SkipLink | RuleId::ColorContrast)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        RuleId::ALL
            .iter()
            .copied()
            .find(|rule| rule.as_str() == wanted)
            .ok_or_else(|| format!("unknown rule '{}'", s))
    }
}
