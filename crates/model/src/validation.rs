//! Validation rules for form input
//!
//! A form field carries a [`RuleSet`]. Password inputs are checked by
//! [`check_password`], which scores the configured requirements and fails
//! fast on the hard ones. Field-level failures accumulate in a
//! [`ValidationReport`] instead of aborting the save.

use dataobjects_core::{EngineError, EngineResult, property_value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Special characters accepted when a rule set defines none
pub const DEFAULT_SPECIAL_CHARACTERS: &str = "@$!%*?&";

/// Score a password needs unless the rule set says otherwise
pub const DEFAULT_MIN_SCORE: u8 = 3;

// ============================================================================
// RuleSet
// ============================================================================

/// Validation constraints of a form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub allow_null: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub require_upper_case: bool,
    pub require_lower_case: bool,
    pub require_number: bool,
    pub require_special_characters: bool,
    pub defined_special_characters: Option<String>,
    pub min_score: u8,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            allow_null: true,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            require_upper_case: false,
            require_lower_case: false,
            require_number: false,
            require_special_characters: false,
            defined_special_characters: None,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl RuleSet {
    /// Property keys of a rule set
    pub const KEYS: &'static [&'static str] = &[
        "allowNull",
        "minLength",
        "maxLength",
        "minValue",
        "maxValue",
        "requireUpperCase",
        "requireLowerCase",
        "requireNumber",
        "requireSpecialCharacters",
        "definedSpecialCharacters",
        "minScore",
    ];

    /// Read a rule by property key
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = match key {
            "allowNull" => json!(self.allow_null),
            "minLength" => json!(self.min_length),
            "maxLength" => json!(self.max_length),
            "minValue" => json!(self.min_value),
            "maxValue" => json!(self.max_value),
            "requireUpperCase" => json!(self.require_upper_case),
            "requireLowerCase" => json!(self.require_lower_case),
            "requireNumber" => json!(self.require_number),
            "requireSpecialCharacters" => json!(self.require_special_characters),
            "definedSpecialCharacters" => json!(self.defined_special_characters),
            "minScore" => json!(self.min_score),
            _ => return None,
        };
        Some(value)
    }

    /// Assign a rule by property key; `Ok(false)` for unknown keys
    pub fn set(&mut self, key: &str, value: Value) -> EngineResult<bool> {
        const CONTAINER: &str = "rule set";
        match key {
            "allowNull" => self.allow_null = property_value(CONTAINER, key, value)?,
            "minLength" => self.min_length = property_value(CONTAINER, key, value)?,
            "maxLength" => self.max_length = property_value(CONTAINER, key, value)?,
            "minValue" => self.min_value = property_value(CONTAINER, key, value)?,
            "maxValue" => self.max_value = property_value(CONTAINER, key, value)?,
            "requireUpperCase" => self.require_upper_case = property_value(CONTAINER, key, value)?,
            "requireLowerCase" => self.require_lower_case = property_value(CONTAINER, key, value)?,
            "requireNumber" => self.require_number = property_value(CONTAINER, key, value)?,
            "requireSpecialCharacters" => {
                self.require_special_characters = property_value(CONTAINER, key, value)?
            }
            "definedSpecialCharacters" => {
                self.defined_special_characters = property_value(CONTAINER, key, value)?
            }
            "minScore" => self.min_score = property_value(CONTAINER, key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Characters that satisfy the special-character requirement
    pub fn special_characters(&self) -> &str {
        self.defined_special_characters
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SPECIAL_CHARACTERS)
    }

    /// Number of scored checks this rule set configures
    fn configured_checks(&self) -> u8 {
        [
            self.min_length.is_some(),
            self.max_length.is_some(),
            self.require_upper_case,
            self.require_lower_case,
            self.require_number,
            self.require_special_characters,
        ]
        .into_iter()
        .filter(|b| *b)
        .count() as u8
    }

    /// Check a numeric input against `minValue`/`maxValue`
    pub fn check_range(&self, value: f64) -> Result<(), String> {
        if let Some(min) = self.min_value
            && value < min
        {
            return Err(format!("must be at least {min}"));
        }
        if let Some(max) = self.max_value
            && value > max
        {
            return Err(format!("must be at most {max}"));
        }
        Ok(())
    }
}

// ============================================================================
// Password Policy
// ============================================================================

/// Outcome of a password check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordVerdict {
    /// Passed with the given score
    Passed { score: u8 },
    /// No value given and the field allows null
    Empty,
    /// Failed; the message names the first unmet requirement
    Failed { score: u8, reason: String },
}

impl PasswordVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, PasswordVerdict::Passed { .. })
    }
}

/// Score a password against a rule set.
///
/// Every configured requirement adds one point when met. Length bounds and
/// the character-class requirements are hard: the first unmet one fails
/// immediately. The total must reach `min_score`, capped at the number of
/// configured checks.
pub fn check_password(rules: &RuleSet, password: Option<&str>) -> PasswordVerdict {
    let password = match password.filter(|p| !p.is_empty()) {
        Some(p) => p,
        None if rules.allow_null => return PasswordVerdict::Empty,
        None => {
            return PasswordVerdict::Failed {
                score: 0,
                reason: "a password is required".to_string(),
            };
        }
    };

    let mut score = 0u8;
    let length = password.chars().count();

    if let Some(min) = rules.min_length {
        if length < min {
            return fail(score, format!("must be at least {min} characters long"));
        }
        score += 1;
    }
    if let Some(max) = rules.max_length {
        if length > max {
            return fail(score, format!("must be at most {max} characters long"));
        }
        score += 1;
    }
    if rules.require_upper_case {
        if !password.chars().any(|c| c.is_uppercase()) {
            return fail(score, "must contain an uppercase letter");
        }
        score += 1;
    }
    if rules.require_lower_case {
        if !password.chars().any(|c| c.is_lowercase()) {
            return fail(score, "must contain a lowercase letter");
        }
        score += 1;
    }
    if rules.require_number {
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return fail(score, "must contain a number");
        }
        score += 1;
    }
    if rules.require_special_characters {
        let specials = rules.special_characters();
        if !password.chars().any(|c| specials.contains(c)) {
            return fail(score, format!("must contain one of the characters {specials}"));
        }
        score += 1;
    }

    let needed = rules.min_score.min(rules.configured_checks());
    if score < needed {
        return fail(score, format!("is too weak (score {score} of {needed})"));
    }
    PasswordVerdict::Passed { score }
}

fn fail(score: u8, reason: impl Into<String>) -> PasswordVerdict {
    PasswordVerdict::Failed {
        score,
        reason: reason.into(),
    }
}

// ============================================================================
// ValidationReport
// ============================================================================

/// Accumulated outcome of validating a form submission
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Messages per field, in the order fields were validated
    pub field_messages: IndexMap<String, Vec<String>>,

    /// Object-level messages shown above the form
    pub error_messages: Vec<String>,
}

impl ValidationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field failure, both on the field and object level
    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        self.error_messages.push(message.clone());
        self.field_messages
            .entry(field.into())
            .or_default()
            .push(message);
    }

    /// Record an object-level message
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: ValidationReport) {
        for (field, messages) in other.field_messages {
            self.field_messages.entry(field).or_default().extend(messages);
        }
        self.error_messages.extend(other.error_messages);
    }

    /// Whether nothing was recorded
    pub fn is_valid(&self) -> bool {
        self.error_messages.is_empty() && self.field_messages.is_empty()
    }

    /// Messages recorded for one field
    pub fn messages_for(&self, field: &str) -> &[String] {
        self.field_messages
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Convert to EngineResult (fails if anything was recorded)
    pub fn to_result(&self) -> EngineResult<()> {
        if self.is_valid() {
            return Ok(());
        }
        let field = self
            .field_messages
            .keys()
            .next()
            .cloned()
            .unwrap_or_default();
        Err(EngineError::validation(field, self.error_messages.join("; ")))
    }
}

// ============================================================================
// Tests
// ============================================================================
