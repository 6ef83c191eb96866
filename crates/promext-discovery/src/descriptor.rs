//! Descriptor metadata served to the host platform.

use serde::Serialize;

/// Singular and plural display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluralLabel {
    pub one: String,
    pub other: String,
}

impl PluralLabel {
    pub fn new(one: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            one: one.into(),
            other: other.into(),
        }
    }
}

/// How and how often the host should call discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDescription {
    pub id: String,
    /// Agents allowed to run this discovery, `LEADER` for a single one.
    pub restrict_to: String,
    pub discover: DiscoverEndpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverEndpoint {
    pub method: String,
    pub path: String,
    pub call_interval: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub attribute: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub attribute: String,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub columns: Vec<Column>,
    pub order_by: Vec<OrderBy>,
}

/// Target type metadata: labels, category, and table layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDescription {
    pub id: String,
    pub label: PluralLabel,
    pub category: String,
    pub version: String,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescription {
    pub attribute: String,
    pub label: PluralLabel,
}
