//! Class-label catalog
//!
//! Fixed, ordered mapping from classifier output index to a short code and a
//! descriptive name. The order must match the classifier's output layout
//! exactly; the prediction engine checks the width when it is built.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabel {
    /// Short code, e.g. `nv`
    pub code: String,

    /// Descriptive name shown to users
    pub name: String,
}

impl ClassLabel {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Ordered label catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelCatalog {
    labels: Vec<ClassLabel>,
}

impl LabelCatalog {
    /// Build a catalog from ordered entries. Codes must be unique.
    pub fn new(labels: Vec<ClassLabel>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::config("label catalog is empty"));
        }
        for (idx, label) in labels.iter().enumerate() {
            if labels[..idx].iter().any(|l| l.code == label.code) {
                return Err(Error::config(format!(
                    "duplicate label code '{}' at index {}",
                    label.code, idx
                )));
            }
        }
        Ok(Self { labels })
    }

    /// HAM10000 ordering used by the skin-lesion checkpoint
    pub fn ham10000() -> Self {
        Self {
            labels: vec![
                ClassLabel::new("akiec", "Actinic keratoses (Aktinik keratoz)"),
                ClassLabel::new("bcc", "Basal cell carcinoma (Bazal hücreli karsinom)"),
                ClassLabel::new(
                    "bkl",
                    "Benign keratosis-like lesions (İyi huylu keratoz benzeri lezyonlar)",
                ),
                ClassLabel::new("df", "Dermatofibroma (Dermatofibrom)"),
                ClassLabel::new("nv", "Melanocytic nevi (Melanositik nevüs)"),
                ClassLabel::new(
                    "vasc",
                    "Pyogenic granulomas and hemorrhage (Piyojenik granülomlar ve kanama)",
                ),
                ClassLabel::new("mel", "Melanoma (Melanom)"),
            ],
        }
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Entry for an output index
    pub fn get(&self, index: usize) -> Option<&ClassLabel> {
        self.labels.get(index)
    }

    /// Iterate entries in output order
    pub fn iter(&self) -> impl Iterator<Item = &ClassLabel> {
        self.labels.iter()
    }

    /// Fail unless the catalog width equals the classifier output width
    pub fn ensure_width(&self, output_width: usize) -> Result<()> {
        if self.labels.len() != output_width {
            return Err(Error::config(format!(
                "label catalog has {} entries but the classifier produces {} outputs",
                self.labels.len(),
                output_width
            )));
        }
        Ok(())
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self::ham10000()
    }
}
