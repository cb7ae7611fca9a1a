//! Label store: the ordered class names matching the model's output positions

use crate::error::ClassifierError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Ordered, immutable list of labels. Index `i` names output `i` of the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Load labels from a newline-delimited text file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|source| ClassifierError::ResourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

        let labels = Self::from_reader(BufReader::new(file)).map_err(|source| {
            ClassifierError::ReadFailure {
                path: path.to_path_buf(),
                source,
            }
        })?;

        info!(path = %path.display(), count = labels.len(), "Labels loaded");
        Ok(labels)
    }

    /// Parse labels from any buffered reader, one label per line.
    ///
    /// Blank lines are kept as empty labels so positions stay aligned with the
    /// model output. A read error discards everything read so far.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let labels = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}
