use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator placed between the two symbols of a rendered [`GenePairKey`].
pub const KEY_SEPARATOR: char = '|';

/// Canonical, order-independent key for a pair of gene identifiers.
///
/// The smaller symbol (by byte-wise lexicographic comparison) is always stored first, so
/// `GenePairKey::new(a, b) == GenePairKey::new(b, a)` for any `a` and `b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenePairKey {
    first: String,
    second: String,
}

impl GenePairKey {
    /// Build the canonical key for two symbols given in any order.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b { Self { first: a, second: b } } else { Self { first: b, second: a } }
    }

    /// The lexicographically smaller symbol.
    pub fn first(&self) -> &str {
        &self.first
    }

    /// The lexicographically larger (or equal) symbol.
    pub fn second(&self) -> &str {
        &self.second
    }

    /// Whether both sides name the same gene.
    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }

    /// Consume the key, returning `(min, max)`.
    pub fn into_parts(self) -> (String, String) {
        (self.first, self.second)
    }

    /// Parse a rendered `min|max` key. The parts are re-canonicalized, so `"B|A"` parses
    /// to the same key as `"A|B"`. Symbols may not contain [`KEY_SEPARATOR`], so a key
    /// with more than one separator is rejected rather than split ambiguously.
    pub fn parse(rendered: &str) -> Result<Self> {
        let (a, b) = rendered
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| anyhow!("gene pair key '{rendered}' has no '{KEY_SEPARATOR}'"))?;
        if a.is_empty() || b.is_empty() {
            return Err(anyhow!("gene pair key '{rendered}' has an empty symbol"));
        }
        if b.contains(KEY_SEPARATOR) {
            return Err(anyhow!("gene pair key '{rendered}' has more than one '{KEY_SEPARATOR}'"));
        }
        Ok(Self::new(a, b))
    }
}

impl fmt::Display for GenePairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.first, self.second)
    }
}

impl FromStr for GenePairKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Database identifier of a stored [`Provenance`].
pub type ProvenanceId = i64;

/// The four identity fields of a data source. Two specs are the same source if and only if
/// all four fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceSpec {
    /// Short source name, e.g. `ARCHS4`.
    pub name: String,
    /// Where the source data was obtained.
    pub url: Option<String>,
    /// Free-text category of the data set.
    pub category: Option<String>,
    /// Free-text subcategory of the data set.
    pub subcategory: Option<String>,
}

impl ProvenanceSpec {
    /// A spec carrying only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), url: None, category: None, subcategory: None }
    }

    /// Set the source URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the subcategory.
    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    /// The ARCHS4 human gene correlation download.
    pub fn archs4() -> Self {
        Self::new("ARCHS4")
            .with_url("https://amp.pharm.mssm.edu/archs4/download.html")
            .with_category("Pairwise pearson correlation of genes across expression samples.")
            .with_subcategory("Human genes")
    }
}

/// A provenance as held by the store: its identity plus the assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Store-assigned identifier, stamped onto every record from this source.
    pub id: ProvenanceId,
    /// Identity fields.
    #[serde(flatten)]
    pub spec: ProvenanceSpec,
}

impl Provenance {
    /// Whether this provenance has exactly the identity described by `spec`.
    pub fn matches(&self, spec: &ProvenanceSpec) -> bool {
        &self.spec == spec
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.spec.name, self.id)
    }
}

/// One stored correlation between two genes under one provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    /// Lexicographically smaller gene symbol.
    pub gene1: String,
    /// Lexicographically larger (or equal) gene symbol.
    pub gene2: String,
    /// Pearson correlation value.
    pub value: f64,
    /// Source this value is attributed to.
    pub provenance_id: ProvenanceId,
}

impl CorrelationRecord {
    /// Build a record with the gene order canonicalized.
    pub fn new(
        gene_a: impl Into<String>,
        gene_b: impl Into<String>,
        value: f64,
        provenance_id: ProvenanceId,
    ) -> Self {
        let (gene1, gene2) = GenePairKey::new(gene_a, gene_b).into_parts();
        Self { gene1, gene2, value, provenance_id }
    }

    /// The pair key of this record.
    pub fn key(&self) -> GenePairKey {
        GenePairKey::new(self.gene1.as_str(), self.gene2.as_str())
    }
}
