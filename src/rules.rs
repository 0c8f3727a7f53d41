//! Silkscreen rewrite rules
//!
//! Each rule is a pure text-to-text transformation over a whole layout file.
//! Record rules delegate to per-record functions that can be tested on a
//! single `(fp_text ...)` record.

use crate::error::{Result, SilkpatchError};
use crate::record::{self, TextRecord};
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

lazy_static! {
    /// Font sizes rewritten to the target size
    static ref OVERSIZED_FONT: Regex =
        Regex::new(r"^\(size\s+(?:0\.7\s+0\.7|1\s+1)\s*\)$").expect("font size regex is valid");

    /// A position with exactly two numbers and no angle
    static ref UNROTATED_POSITION: Regex =
        Regex::new(r"^\(at\s+(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)\s*\)$")
            .expect("position regex is valid");
}

/// Default reference prefix identifying test points
pub const DEFAULT_TEST_POINT_PREFIX: &str = "TP";

/// Tunable values used by the rules
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOptions {
    pub test_point_prefix: String,

    /// Angle in degrees appended to unrotated test-point labels
    pub rotation: f64,

    /// Width and height written by the font size rule
    pub font_size: f64,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            test_point_prefix: DEFAULT_TEST_POINT_PREFIX.to_string(),
            rotation: 90.0,
            font_size: 0.6,
        }
    }
}

/// A single rewrite step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// `(size 0.7 0.7)` and `(size 1 1)` inside font blocks become the target size
    FontSize,
    /// Every reference label gets a `hide` marker after its layer
    DefaultHide,
    /// Repeated `hide` markers in a reference label collapse to one
    CollapseHide,
    /// Test-point reference labels lose every `hide` marker
    TestPointShow,
    /// Test-point reference labels without an angle get the configured rotation
    TestPointRotation,
}

impl Rule {
    /// All rules in their standard application order
    pub const STANDARD: [Rule; 5] = [
        Rule::FontSize,
        Rule::DefaultHide,
        Rule::CollapseHide,
        Rule::TestPointShow,
        Rule::TestPointRotation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::FontSize => "font-size",
            Rule::DefaultHide => "default-hide",
            Rule::CollapseHide => "collapse-hide",
            Rule::TestPointShow => "test-point-show",
            Rule::TestPointRotation => "test-point-rotation",
        }
    }

    /// Rules that must already have run when this rule runs
    fn prerequisites(&self) -> &'static [Rule] {
        match self {
            Rule::CollapseHide => &[Rule::DefaultHide],
            Rule::TestPointShow => &[Rule::DefaultHide, Rule::CollapseHide],
            Rule::FontSize | Rule::DefaultHide | Rule::TestPointRotation => &[],
        }
    }

    /// Apply this rule to a whole layout file
    pub fn apply<'t>(&self, text: &'t str, options: &RuleOptions) -> Cow<'t, str> {
        match self {
            Rule::FontSize => normalize_font_sizes(text, options.font_size),
            Rule::DefaultHide => record::rewrite_records(text, |rec| {
                rec.is_reference().then(|| insert_hide(rec))
            }),
            Rule::CollapseHide => record::rewrite_records(text, |rec| {
                if !rec.is_reference() {
                    return None;
                }
                owned(collapse_hide(rec.body())).map(|body| rec.with_body(&body))
            }),
            Rule::TestPointShow => record::rewrite_records(text, |rec| {
                if !rec.is_test_point(&options.test_point_prefix) {
                    return None;
                }
                owned(remove_hide(rec.body())).map(|body| rec.with_body(&body))
            }),
            Rule::TestPointRotation => record::rewrite_records(text, |rec| {
                if !rec.is_test_point(&options.test_point_prefix) {
                    return None;
                }
                owned(add_rotation(rec.body(), options.rotation)).map(|body| rec.with_body(&body))
            }),
        }
    }
}

fn owned(text: Cow<'_, str>) -> Option<String> {
    match text {
        Cow::Owned(s) => Some(s),
        Cow::Borrowed(_) => None,
    }
}

/// Rewrite oversized `(size ...)` groups found inside `(font ...)` blocks
pub fn normalize_font_sizes(text: &str, target: f64) -> Cow<'_, str> {
    let replacement = format!("(size {} {})", target, target);
    let edits = record::lists_named(text, "font")
        .into_iter()
        .flat_map(|font| {
            record::lists_named(&text[font.clone()], "size")
                .into_iter()
                .map(move |size| (font.start + size.start)..(font.start + size.end))
        })
        .filter(|size| OVERSIZED_FONT.is_match(&text[size.clone()]))
        .map(|size| (size, replacement.clone()))
        .collect();
    record::splice(text, edits)
}

/// Insert a `hide` marker right after the record's layer field
///
/// Records without a layer field get the marker before their closing
/// parenthesis.
pub fn insert_hide(record: &TextRecord<'_>) -> String {
    let body = record.body();
    let at = record::lists_named(body, "layer")
        .first()
        .map(|layer| layer.end)
        .unwrap_or_else(|| body.len().saturating_sub(1));
    record.with_body(&format!("{} hide{}", &body[..at], &body[at..]))
}

/// Keep the first `hide` marker of a record body, drop the rest
pub fn collapse_hide(body: &str) -> Cow<'_, str> {
    let edits = record::hide_markers(body)
        .into_iter()
        .skip(1)
        .map(|marker| (marker, String::new()))
        .collect();
    record::splice(body, edits)
}

/// Drop every `hide` marker from a record body
pub fn remove_hide(body: &str) -> Cow<'_, str> {
    let edits = record::hide_markers(body)
        .into_iter()
        .map(|marker| (marker, String::new()))
        .collect();
    record::splice(body, edits)
}

/// Append `angle` to a two-number `(at X Y)` position
///
/// A position that already carries a third element is left as it is.
pub fn add_rotation(body: &str, angle: f64) -> Cow<'_, str> {
    let Some(position) = record::lists_named(body, "at").into_iter().next() else {
        return Cow::Borrowed(body);
    };
    let Some(caps) = UNROTATED_POSITION.captures(&body[position.clone()]) else {
        return Cow::Borrowed(body);
    };
    let rotated = format!("(at {} {} {})", &caps[1], &caps[2], angle);
    record::splice(body, vec![(position, rotated)])
}

/// An ordered list of rules with validated dependencies
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    options: RuleOptions,
}

impl RuleSet {
    /// Build a rule set, rejecting orders where a rule precedes one it depends on
    pub fn new(rules: Vec<Rule>, options: RuleOptions) -> Result<Self> {
        for (index, rule) in rules.iter().enumerate() {
            for required in rule.prerequisites() {
                if rules[index + 1..].contains(required) && !rules[..index].contains(required) {
                    return Err(SilkpatchError::RuleOrder {
                        rule: rule.name(),
                        requires: required.name(),
                    }
                    .into());
                }
            }
        }
        Ok(Self { rules, options })
    }

    /// All five rules in their standard order
    pub fn standard(options: RuleOptions) -> Self {
        Self {
            rules: Rule::STANDARD.to_vec(),
            options,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    /// Run every rule in order over one layout file
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut current = Cow::Borrowed(text);
        for rule in &self.rules {
            let rewritten = owned(rule.apply(&current, &self.options));
            if let Some(next) = rewritten {
                debug!("Rule {} changed the document", rule.name());
                current = Cow::Owned(next);
            }
        }
        current
    }
}
