//! # Counter Options
//!
//! Options arrive loosely typed (from code, a TOML table or a JSON object)
//! and are merged into an [`OptionStore`] whose defaults table fixes the
//! kind of every key. The same rules apply at merge time and on every
//! later write:
//!
//! - unknown keys are ignored
//! - a value of the wrong kind is ignored and the current value kept
//! - numbers are accepted for integer keys when finite, and rounded
//!
//! | key         | kind    | default                        |
//! |-------------|---------|--------------------------------|
//! | `timestamp` | integer | time the store was created     |
//! | `template`  | text    | [`DEFAULT_TEMPLATE`]           |
//! | `interval`  | integer | 1000 (ms, must be positive)    |
//! | `autostart` | flag    | false                          |

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::Timestamp;

/// Classic `DDD:HH:MM:SS` layout: three day digits, two for every other unit.
pub const DEFAULT_TEMPLATE: &str = concat!(
    r#"<div class="counter">"#,
    r#"<span class="digit day char3">0</span>"#,
    r#"<span class="digit day char2">0</span>"#,
    r#"<span class="digit day char1 sep">0</span>"#,
    r#"<span class="digit hrs char2">0</span>"#,
    r#"<span class="digit hrs char1 sep dot">0</span>"#,
    r#"<span class="digit min char2">0</span>"#,
    r#"<span class="digit min char1 sep dot">0</span>"#,
    r#"<span class="digit sec char2">0</span>"#,
    r#"<span class="digit sec char1">0</span>"#,
    r#"</div>"#,
);

/// Tick period used when none is configured.
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

/// A loosely typed option value.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// The kind a key accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Integer,
    Text,
    Flag,
}

impl OptionValue {
    /// Kind of the value; any number is an integer candidate.
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Flag(_) => OptionKind::Flag,
            OptionValue::Integer(_) | OptionValue::Float(_) => OptionKind::Integer,
            OptionValue::Text(_) => OptionKind::Text,
        }
    }

    /// Normalize the value for a key of `kind`, or `None` if it does not fit.
    pub fn coerce(&self, kind: OptionKind) -> Option<OptionValue> {
        match (kind, self) {
            (OptionKind::Integer, OptionValue::Integer(v)) => Some(OptionValue::Integer(*v)),
            (OptionKind::Integer, OptionValue::Float(v)) => {
                float_to_integer(*v).map(OptionValue::Integer)
            }
            (OptionKind::Text, OptionValue::Text(v)) => Some(OptionValue::Text(v.clone())),
            (OptionKind::Flag, OptionValue::Flag(v)) => Some(OptionValue::Flag(*v)),
            _ => None,
        }
    }

    /// Numeric reading of the value, parsing text when it holds a number.
    ///
    /// ```
    /// use counter_clock_lib::OptionValue;
    ///
    /// assert_eq!(OptionValue::from(" 1500 ").to_integer(), Some(1500));
    /// assert_eq!(OptionValue::from(2.6).to_integer(), Some(3));
    /// assert_eq!(OptionValue::from("soon").to_integer(), None);
    /// assert_eq!(OptionValue::from(true).to_integer(), None);
    /// ```
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(v) => Some(*v),
            OptionValue::Float(v) => float_to_integer(*v),
            OptionValue::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().and_then(float_to_integer))
            }
            OptionValue::Flag(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            OptionValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert a TOML value. Arrays, tables and datetimes have no option form.
    pub fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Boolean(v) => Some(OptionValue::Flag(*v)),
            toml::Value::Integer(v) => Some(OptionValue::Integer(*v)),
            toml::Value::Float(v) => Some(OptionValue::Float(*v)),
            toml::Value::String(v) => Some(OptionValue::Text(v.clone())),
            _ => None,
        }
    }

    /// Convert a JSON value. Null, arrays and objects have no option form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(v) => Some(OptionValue::Flag(*v)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => Some(OptionValue::Integer(v)),
                None => n.as_f64().map(OptionValue::Float),
            },
            serde_json::Value::String(v) => Some(OptionValue::Text(v.clone())),
            _ => None,
        }
    }
}

fn float_to_integer(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Some(value.round() as i64)
    } else {
        None
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Flag(v) => write!(f, "{v}"),
            OptionValue::Integer(v) => write!(f, "{v}"),
            OptionValue::Float(v) => write!(f, "{v}"),
            OptionValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Flag(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Integer(value.into())
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Integer(value.into())
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// The keys an [`OptionStore`] knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionKey {
    Timestamp,
    Template,
    Interval,
    Autostart,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [
        OptionKey::Timestamp,
        OptionKey::Template,
        OptionKey::Interval,
        OptionKey::Autostart,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OptionKey::Timestamp => "timestamp",
            OptionKey::Template => "template",
            OptionKey::Interval => "interval",
            OptionKey::Autostart => "autostart",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    pub fn kind(self) -> OptionKind {
        match self {
            OptionKey::Timestamp | OptionKey::Interval => OptionKind::Integer,
            OptionKey::Template => OptionKind::Text,
            OptionKey::Autostart => OptionKind::Flag,
        }
    }

    fn accepts(self, value: &OptionValue) -> bool {
        match (self, value) {
            (OptionKey::Interval, OptionValue::Integer(ms)) => *ms > 0,
            _ => true,
        }
    }
}

/// User-supplied options, not yet validated.
///
/// ```
/// use counter_clock_lib::Options;
///
/// let options = Options::new()
///     .timestamp(1_700_000_000_000)
///     .set("interval", 500)
///     .set("colour", "red");
/// assert_eq!(options.len(), 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    entries: BTreeMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(self, millis: Timestamp) -> Self {
        self.set(OptionKey::Timestamp.name(), millis)
    }

    pub fn template(self, template: impl Into<String>) -> Self {
        self.set(OptionKey::Template.name(), template.into())
    }

    pub fn interval(self, millis: i64) -> Self {
        self.set(OptionKey::Interval.name(), millis)
    }

    pub fn autostart(self, autostart: bool) -> Self {
        self.set(OptionKey::Autostart.name(), autostart)
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries of `other` override entries of `self`.
    pub fn extend(mut self, other: Options) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Build from a TOML table, skipping values with no option form.
    pub fn from_toml(table: &toml::Table) -> Self {
        let mut options = Options::new();
        for (key, value) in table {
            match OptionValue::from_toml(value) {
                Some(value) => {
                    options.entries.insert(key.clone(), value);
                }
                None => debug!(key = %key, "skipping option with unsupported TOML type"),
            }
        }
        options
    }

    /// Build from a JSON object such as `{"interval": 500}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let object: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut options = Options::new();
        for (key, value) in &object {
            match OptionValue::from_json(value) {
                Some(value) => {
                    options.entries.insert(key.clone(), value);
                }
                None => debug!(key = %key, "skipping option with unsupported JSON type"),
            }
        }
        Ok(options)
    }
}

/// Validated options of one counter.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionStore {
    defaults: BTreeMap<OptionKey, OptionValue>,
    values: BTreeMap<OptionKey, OptionValue>,
}

impl OptionStore {
    /// A store holding only defaults. `now` becomes the default timestamp.
    pub fn new(now: Timestamp) -> Self {
        let defaults: BTreeMap<_, _> = [
            (OptionKey::Timestamp, OptionValue::Integer(now)),
            (OptionKey::Template, OptionValue::from(DEFAULT_TEMPLATE)),
            (OptionKey::Interval, OptionValue::Integer(DEFAULT_INTERVAL_MS)),
            (OptionKey::Autostart, OptionValue::Flag(false)),
        ]
        .into_iter()
        .collect();
        Self {
            values: defaults.clone(),
            defaults,
        }
    }

    /// Defaults merged with `options`.
    pub fn with_options(now: Timestamp, options: &Options) -> Self {
        let mut store = Self::new(now);
        store.merge(options);
        store
    }

    /// Apply every entry of `options`. Returns the keys that were accepted.
    pub fn merge(&mut self, options: &Options) -> Vec<OptionKey> {
        options
            .iter()
            .filter_map(|(name, value)| {
                let key = OptionKey::from_name(name)?;
                self.write(key, value).then_some(key)
            })
            .collect()
    }

    /// Set the option called `name`. `false` when the key is unknown or the
    /// value was rejected.
    pub fn set(&mut self, name: &str, value: &OptionValue) -> bool {
        match OptionKey::from_name(name) {
            Some(key) => self.write(key, value),
            None => {
                debug!(option = name, "ignoring unknown option");
                false
            }
        }
    }

    /// Set `key`, keeping the current value if `value` does not fit.
    pub fn write(&mut self, key: OptionKey, value: &OptionValue) -> bool {
        match value.coerce(key.kind()).filter(|v| key.accepts(v)) {
            Some(value) => {
                self.values.insert(key, value);
                true
            }
            None => {
                debug!(option = key.name(), %value, "rejecting option of the wrong type");
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(&OptionKey::from_name(name)?)
    }

    pub fn default_value(&self, key: OptionKey) -> &OptionValue {
        &self.defaults[&key]
    }

    /// Put `key` back to its default.
    pub fn restore_default(&mut self, key: OptionKey) {
        self.values.insert(key, self.defaults[&key].clone());
    }

    pub fn timestamp(&self) -> Timestamp {
        self.integer(OptionKey::Timestamp)
    }

    pub fn template(&self) -> &str {
        self.values[&OptionKey::Template]
            .as_text()
            .unwrap_or(DEFAULT_TEMPLATE)
    }

    pub fn interval_ms(&self) -> u64 {
        self.integer(OptionKey::Interval).max(1) as u64
    }

    pub fn autostart(&self) -> bool {
        self.values[&OptionKey::Autostart]
            .as_flag()
            .unwrap_or(false)
    }

    fn integer(&self, key: OptionKey) -> i64 {
        self.values[&key]
            .as_integer()
            .or_else(|| self.defaults[&key].as_integer())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = OptionStore::new(1234);
        assert_eq!(store.timestamp(), 1234);
        assert_eq!(store.template(), DEFAULT_TEMPLATE);
        assert_eq!(store.interval_ms(), 1000);
        assert!(!store.autostart());
    }

    #[test]
    fn test_merge_accepts_matching_kinds() {
        let options = Options::new()
            .timestamp(99)
            .template("<p></p>")
            .interval(250)
            .autostart(true);
        let store = OptionStore::with_options(0, &options);
        assert_eq!(store.timestamp(), 99);
        assert_eq!(store.template(), "<p></p>");
        assert_eq!(store.interval_ms(), 250);
        assert!(store.autostart());
    }

    #[test]
    fn test_merge_falls_back_to_defaults_on_wrong_kinds() {
        let options = Options::new()
            .set("timestamp", "tomorrow")
            .set("template", 5)
            .set("interval", -10)
            .set("autostart", "yes");
        let mut store = OptionStore::new(7);
        let accepted = store.merge(&options);
        assert!(accepted.is_empty());
        assert_eq!(store, OptionStore::new(7));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut store = OptionStore::new(0);
        let accepted = store.merge(&Options::new().set("colour", "red").set("interval", 10));
        assert_eq!(accepted, vec![OptionKey::Interval]);
        assert!(store.get("colour").is_none());
        assert!(!store.set("colour", &OptionValue::from("blue")));
    }

    #[test]
    fn test_numbers_are_coerced_for_integer_keys() {
        let mut store = OptionStore::new(0);
        assert!(store.set("timestamp", &OptionValue::Float(12.6)));
        assert_eq!(store.timestamp(), 13);
        assert!(!store.set("timestamp", &OptionValue::Float(f64::NAN)));
        assert!(!store.set("timestamp", &OptionValue::Float(f64::INFINITY)));
        assert_eq!(store.timestamp(), 13);
    }

    #[test]
    fn test_restore_default() {
        let mut store = OptionStore::with_options(5, &Options::new().timestamp(6));
        store.restore_default(OptionKey::Timestamp);
        assert_eq!(store.timestamp(), 5);
        assert_eq!(store.default_value(OptionKey::Interval), &OptionValue::Integer(1000));
    }

    #[test]
    fn test_options_from_toml() {
        let table: toml::Table = toml::from_str(
            r#"
            timestamp = 42
            interval = 2.0
            autostart = true
            template = "<b></b>"
            nested = [1, 2]
            "#,
        )
        .unwrap();
        let options = Options::from_toml(&table);
        assert_eq!(options.len(), 4);
        let store = OptionStore::with_options(0, &options);
        assert_eq!(store.timestamp(), 42);
        assert_eq!(store.interval_ms(), 2);
        assert!(store.autostart());
    }

    #[test]
    fn test_options_from_json() {
        let options = Options::from_json(r#"{"interval": 500, "autostart": false, "x": null}"#).unwrap();
        assert_eq!(options.get("interval"), Some(&OptionValue::Integer(500)));
        assert_eq!(options.get("autostart"), Some(&OptionValue::Flag(false)));
        assert!(options.get("x").is_none());
        assert!(Options::from_json("[1]").is_err());
    }

    #[test]
    fn test_extend_overrides() {
        let base = Options::new().interval(100).autostart(true);
        let merged = base.extend(Options::new().interval(200));
        assert_eq!(merged.get("interval"), Some(&OptionValue::Integer(200)));
        assert_eq!(merged.get("autostart"), Some(&OptionValue::Flag(true)));
    }
}
