//! Snippet placeholder engine.
//!
//! Three placeholder families are recognised:
//!
//! - `@date(+7d)`, `@date(+2w)`, `@date(+3m)`: resolved on the spot to `DD/MM/YYYY`.
//! - `{mild|moderate*|severe}`: a choice, `*` marks the default option.
//! - `[Name]`: a free-text variable.
//!
//! Choices and variables are handed back to the caller, who supplies a
//! mapping from raw placeholder text to replacement and calls
//! [`apply_resolutions`].

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::{Days, Local, Months, NaiveDate};
use regex::{Captures, Regex};

/// `{a|b*|c}`: one or more characters that are not a closing brace.
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static CHOICE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"\{([^}]+)\}").expect("valid choice regex"));

/// `@date(+<N><unit>)` with unit d, w or m.
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"@date\(\+(\d+)([dwm])\)").expect("valid date regex"));

/// `[Name]`: one or more characters that are not a closing bracket.
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static VARIABLE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"\[([^\]]+)\]").expect("valid variable regex"));

/// A pick-one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceToken {
    /// Index of the option marked with `*`, or 0.
    pub default_index: usize,
    /// Options in authoring order, default marker stripped.
    pub options: Vec<String>,
    /// The literal placeholder text, braces included.
    pub raw: String,
}

impl ChoiceToken {
    /// The option used when the caller makes no choice. An out-of-range
    /// default falls back to the first option.
    pub fn default_option(&self) -> &str {
        return self
            .options
            .get(self.default_index)
            .or_else(|| return self.options.first())
            .map_or("", String::as_str);
    }
}

/// Output of [`parse_tokens`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSnippet {
    /// Snippet text with every date placeholder already replaced.
    pub text_with_dates_resolved: String,
    /// Distinct choice and variable placeholders, first-seen order per family.
    pub tokens: Vec<UnresolvedToken>,
}

/// A placeholder the caller must resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedToken {
    /// `{a|b|c}`
    Choice(ChoiceToken),
    /// `[Name]`
    Variable(VariableToken),
}

impl UnresolvedToken {
    /// The literal placeholder text used as the resolution key.
    pub fn raw(&self) -> &str {
        return match self {
            UnresolvedToken::Choice(choice) => &choice.raw,
            UnresolvedToken::Variable(variable) => &variable.raw,
        };
    }
}

/// A free-text placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableToken {
    /// Bracket contents, shown to the user as the prompt.
    pub name: String,
    /// The literal placeholder text, brackets included.
    pub raw: String,
}

/// Replace every occurrence of each raw placeholder with its value.
///
/// Each entry is applied on its own; raw placeholder texts are disjoint
/// literals so the order of application does not matter.
pub fn apply_resolutions(text: &str, resolutions: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (raw, value) in resolutions {
        if raw.is_empty() {
            continue;
        }
        result = result.replace(raw.as_str(), value);
    }
    return result;
}

/// Resolve every choice to its default option. Variables have no default
/// and are left out.
pub fn default_resolutions(tokens: &[UnresolvedToken]) -> BTreeMap<String, String> {
    return tokens
        .iter()
        .filter_map(|token| {
            return match token {
                UnresolvedToken::Choice(choice) => {
                    Some((choice.raw.clone(), choice.default_option().to_string()))
                },
                UnresolvedToken::Variable(_) => None,
            };
        })
        .collect();
}

/// Turn a capture of [`DATE_TOKEN`] into a formatted date, or leave the
/// placeholder untouched if the offset overflows the calendar.
fn format_date_capture(cap: &Captures<'_>, today: NaiveDate) -> String {
    let whole = cap.get(0).map_or("", |m| return m.as_str());
    let amount = cap.get(1).and_then(|m| return m.as_str().parse::<u32>().ok());
    let unit = cap.get(2).map_or("", |m| return m.as_str());

    let Some(amount) = amount else {
        tracing::warn!(token = whole, "date offset out of range, left unresolved");
        return whole.to_string();
    };

    let target = match unit {
        "d" => today.checked_add_days(Days::new(u64::from(amount))),
        "m" => today.checked_add_months(Months::new(amount)),
        "w" => today.checked_add_days(Days::new(u64::from(amount).saturating_mul(7))),
        _ => None,
    };

    return match target {
        None => {
            tracing::warn!(token = whole, "date offset out of range, left unresolved");
            whole.to_string()
        },
        Some(date) => date.format("%d/%m/%Y").to_string(),
    };
}

/// Split choice contents into options and a default index.
///
/// Malformed input never fails: empty options are dropped and, if nothing is
/// left, the whole thing degenerates to a single option.
fn parse_choice_options(inner: &str) -> (Vec<String>, usize) {
    let mut options = Vec::new();
    let mut default_index = None;

    for part in inner.split('|') {
        let trimmed = part.trim();
        let (option, is_default) = match trimmed.strip_suffix('*') {
            Some(stripped) => (stripped.trim(), true),
            None => (trimmed, false),
        };
        if option.is_empty() {
            continue;
        }
        if is_default && default_index.is_none() {
            default_index = Some(options.len());
        }
        options.push(option.to_string());
    }

    if options.is_empty() {
        let fallback = inner.replace(['|', '*'], "").trim().to_string();
        return (vec![fallback], 0);
    }

    return (options, default_index.unwrap_or(0));
}

/// Resolve dates against today's local date and extract the rest.
pub fn parse_tokens(content: &str) -> ParsedSnippet {
    return parse_tokens_on(content, Local::now().date_naive());
}

/// Resolve dates against `today` and extract choice and variable placeholders.
pub fn parse_tokens_on(content: &str, today: NaiveDate) -> ParsedSnippet {
    let text = DATE_TOKEN
        .replace_all(content, |cap: &Captures<'_>| return format_date_capture(cap, today))
        .into_owned();

    let mut tokens = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for cap in CHOICE_TOKEN.captures_iter(&text) {
        let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if !seen.insert(whole.as_str().to_string()) {
            continue;
        }
        let (options, default_index) = parse_choice_options(inner.as_str());
        tokens.push(UnresolvedToken::Choice(ChoiceToken {
            default_index,
            options,
            raw: whole.as_str().to_string(),
        }));
    }

    for cap in VARIABLE_TOKEN.captures_iter(&text) {
        let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if !seen.insert(whole.as_str().to_string()) {
            continue;
        }
        tokens.push(UnresolvedToken::Variable(VariableToken {
            name: inner.as_str().to_string(),
            raw: whole.as_str().to_string(),
        }));
    }

    return ParsedSnippet { text_with_dates_resolved: text, tokens };
}
