use crate::error::{ClassifyError, Result};

/// Ordered class labels; entry `i` names model output channel `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCatalog {
    labels: Vec<String>,
}

impl LabelCatalog {
    /// Parse a UTF-8 label file, one label per line. Blank lines are skipped.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ClassifyError::LabelAsset(format!("not UTF-8: {}", e)))?;

        let labels: Vec<String> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        if labels.is_empty() {
            return Err(ClassifyError::LabelAsset("no labels found".into()));
        }

        Ok(Self { labels })
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Label `index` with its ordering prefix removed.
    pub fn display_name(&self, index: usize) -> Option<&str> {
        self.get(index).map(format_label)
    }
}

/// Strip everything up to and including the first space.
///
/// Label files prefix each entry with an ordinal (`"2 20대"`); only the text
/// after it is shown. Labels without a space pass through unchanged.
pub fn format_label(label: &str) -> &str {
    match label.split_once(' ') {
        Some((_, rest)) => rest,
        None => label,
    }
}
