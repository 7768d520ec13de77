use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Shape of a derived key. Both the separator and the optional suffix vary
/// between workflows, so neither is fixed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFormat {
    pub prefix: String,
    pub separator: String,
    pub suffix: Option<String>,
}

impl KeyFormat {
    /// `chat_<date>_<time>_<session>.html`, compared against transcript file names.
    pub fn transcript() -> Self {
        Self {
            prefix: "chat_".to_string(),
            separator: "_".to_string(),
            suffix: Some(".html".to_string()),
        }
    }

    /// `chat_<date>_<time>_<session>`, written into the `MATCH NAME` column.
    pub fn column() -> Self {
        Self {
            suffix: None,
            ..Self::transcript()
        }
    }

    /// `chat_<date><time><session>` with no separators at all.
    pub fn concatenated() -> Self {
        Self {
            separator: String::new(),
            ..Self::column()
        }
    }

    pub fn describe(&self) -> String {
        let sep = &self.separator;
        format!(
            "{}<date>{}<time>{}<session>{}",
            self.prefix,
            sep,
            sep,
            self.suffix.as_deref().unwrap_or("")
        )
    }
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self::transcript()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MatchKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build the match key for one row.
///
/// The date is rewritten textually (`/` becomes `-`), not reparsed, so a
/// `DD/MM/YYYY` cell keeps its day-first order. Colons are dropped from the
/// time. Separator characters inside `session_id` are not escaped.
pub fn derive_key(date: &str, time: &str, session_id: &str, format: &KeyFormat) -> MatchKey {
    let date = date.replace('/', "-");
    let time = time.replace(':', "");

    let mut key = String::with_capacity(
        format.prefix.len() + date.len() + time.len() + session_id.len() + 2 * format.separator.len() + 5,
    );
    key.push_str(&format.prefix);
    key.push_str(&date);
    key.push_str(&format.separator);
    key.push_str(&time);
    key.push_str(&format.separator);
    key.push_str(session_id);
    if let Some(ref suffix) = format.suffix {
        key.push_str(suffix);
    }

    MatchKey(key)
}

/// The set of keys derived from a table, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<MatchKey>,
    index: HashSet<String>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: MatchKey) -> bool {
        if self.index.insert(key.as_str().to_string()) {
            self.keys.push(key);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchKey> {
        self.keys.iter()
    }
}

impl FromIterator<MatchKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = MatchKey>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}
