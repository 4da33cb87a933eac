use crate::inference::ClassScores;
use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs::File, path::Path};

/// Class index -> display string, validated to cover exactly `0..N-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

/// Accepted on-disk layouts of the label file.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    /// `["Ka", "Ma", ...]` ordered by class index.
    List(Vec<String>),
    /// `{"0": "Ka", "1": "Ma", ...}` keyed by stringified class index.
    Map(BTreeMap<String, String>),
}

/// Resolved classifier output for one glyph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
    /// Highest-probability classes first, including the winner.
    pub ranked: Vec<(String, f32)>,
}

impl Prediction {
    /// Winner's probability as a percentage.
    pub fn confidence_percent(&self) -> f32 {
        self.probability * 100.0
    }
}

impl LabelMap {
    /// Builds a map from labels already ordered by class index.
    pub fn new(labels: Vec<String>) -> Result<Self> {
        ensure!(!labels.is_empty(), "label map is empty");
        Ok(Self { labels })
    }

    /// Builds a map from `(index, label)` pairs, rejecting gaps and duplicates.
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, String)>) -> Result<Self> {
        let mut by_index = BTreeMap::new();
        for (index, label) in entries {
            if by_index.insert(index, label).is_some() {
                bail!("class index {index} appears more than once");
            }
        }
        for (expected, index) in by_index.keys().enumerate() {
            ensure!(
                *index == expected,
                "class indices must be contiguous from 0, missing index {expected}"
            );
        }
        Self::new(by_index.into_values().collect())
    }

    /// Loads a label file written as a JSON array or as an object keyed by
    /// stringified integers.
    ///
    /// # Arguments
    /// - `path`: usually `index_to_label.json` next to the weights.
    ///
    /// # Returns
    /// - The validated map, or an error naming the file and the problem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open label file {}", path.display()))?;
        let parsed: LabelFile = serde_json::from_reader(file)
            .with_context(|| format!("failed to parse label file {}", path.display()))?;
        Self::from_file(parsed).with_context(|| format!("invalid label file {}", path.display()))
    }

    /// Parses label JSON held in memory.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: LabelFile = serde_json::from_str(json).context("failed to parse label JSON")?;
        Self::from_file(parsed)
    }

    fn from_file(parsed: LabelFile) -> Result<Self> {
        match parsed {
            LabelFile::List(labels) => Self::new(labels),
            LabelFile::Map(map) => {
                let entries = map
                    .into_iter()
                    .map(|(key, label)| {
                        key.trim()
                            .parse::<usize>()
                            .map(|index| (index, label))
                            .map_err(|_| anyhow!("label key {key:?} is not a class index"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::from_entries(entries)
            }
        }
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().map(String::as_str).enumerate()
    }

    /// Turns a probability vector into a [`Prediction`].
    ///
    /// # Arguments
    /// - `scores`: classifier output, one probability per class.
    /// - `top_k`: ranked alternatives to keep (at least one).
    ///
    /// # Returns
    /// - The winning label with its probability and the ranked alternatives.
    /// - An error when the vector is empty, has a different length than the
    ///   map, or contains a non-finite value.
    pub fn resolve(&self, scores: &ClassScores, top_k: usize) -> Result<Prediction> {
        let probabilities = scores.probabilities();
        ensure!(
            probabilities.len() == self.labels.len(),
            "classifier returned {} scores for {} classes",
            probabilities.len(),
            self.labels.len()
        );
        let (class_index, probability) = scores.argmax()?;
        let label = self
            .get(class_index)
            .ok_or_else(|| anyhow!("class index {class_index} is out of range"))?
            .to_string();

        let ranked = scores
            .ranked()
            .into_iter()
            .take(top_k.max(1))
            .map(|(idx, prob)| (self.labels[idx].clone(), prob))
            .collect();

        Ok(Prediction {
            class_index,
            label,
            probability,
            ranked,
        })
    }
}
