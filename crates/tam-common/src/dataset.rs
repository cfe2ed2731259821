//! Dataset references.

use serde::{Deserialize, Serialize};

/// A request's dataset argument: one dataset or an ordered list of them.
///
/// The computation always runs against [`DatasetRef::primary`], the first
/// named dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetRef {
    Single(String),
    List(Vec<String>),
}

impl DatasetRef {
    /// The dataset the computation runs against, if any is named.
    pub fn primary(&self) -> Option<&str> {
        match self {
            DatasetRef::Single(name) => Some(name.as_str()),
            DatasetRef::List(names) => names.first().map(String::as_str),
        }
    }

    /// All named datasets, in request order.
    pub fn names(&self) -> &[String] {
        match self {
            DatasetRef::Single(name) => std::slice::from_ref(name),
            DatasetRef::List(names) => names,
        }
    }
}

impl From<&str> for DatasetRef {
    fn from(name: &str) -> Self {
        DatasetRef::Single(name.to_string())
    }
}

impl From<String> for DatasetRef {
    fn from(name: String) -> Self {
        DatasetRef::Single(name)
    }
}

impl From<Vec<String>> for DatasetRef {
    fn from(names: Vec<String>) -> Self {
        DatasetRef::List(names)
    }
}
