//! Mapping documents, command-line overrides, and the resolved mapping.
//!
//! A [`MappingConfiguration`] is produced by [`resolve`] in two validated
//! steps: the JSON document is turned into a configuration, then additive
//! command-line overrides are merged into it. Each step checks that no target
//! column is claimed by more than one source category and reports every
//! collision it finds at once. Overrides may add columns but never replace a
//! document-declared one.

use std::{collections::BTreeMap, fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    case_fold::{CaseFoldSet, fold},
    error::{LoadError, LoadResult},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub map: BTreeMap<String, String>,
    #[serde(default)]
    pub synthetics: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub timestamps: Vec<String>,
    #[serde(default)]
    pub linenumbers: Vec<String>,
    #[serde(default)]
    pub uuidcolumns: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl MappingDocument {
    pub fn load(path: &Path) -> LoadResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            LoadError::Configuration(format!("Reading mapping document {path:?}: {err}"))
        })?;
        Self::parse(&raw)
            .map_err(|err| LoadError::Configuration(format!("Mapping document {path:?}: {err}")))
    }

    pub fn parse(raw: &str) -> LoadResult<Self> {
        serde_json::from_str(raw).map_err(|err| {
            LoadError::Configuration(format!("Parsing mapping document JSON: {err}"))
        })
    }
}

/// Additive mapping input taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct MappingOverrides {
    pub table: Option<String>,
    /// `column=value` specs; each entry may hold several comma-separated pairs.
    pub synthetics: Vec<String>,
    pub timestamps: Vec<String>,
    pub linenumbers: Vec<String>,
    pub uuids: Vec<String>,
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingCategory {
    Header,
    Synthetic,
    Timestamp,
    LineNumber,
    Uuid,
}

impl fmt::Display for MappingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MappingCategory::Header => "map",
            MappingCategory::Synthetic => "synthetics",
            MappingCategory::Timestamp => "timestamps",
            MappingCategory::LineNumber => "linenumbers",
            MappingCategory::Uuid => "uuidcolumns",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConfiguration {
    table: String,
    header_map: Vec<(String, String)>,
    synthetics: Vec<(String, String)>,
    timestamps: Vec<String>,
    linenumbers: Vec<String>,
    uuids: Vec<String>,
    ignored: CaseFoldSet,
    strict: bool,
}

/// Resolves the document, then merges the overrides into it.
pub fn resolve(
    document: &MappingDocument,
    overrides: &MappingOverrides,
) -> LoadResult<MappingConfiguration> {
    MappingConfiguration::from_document(document)?.merge(overrides)
}

impl MappingConfiguration {
    pub fn from_document(document: &MappingDocument) -> LoadResult<Self> {
        let table = document
            .table
            .as_deref()
            .map(str::trim)
            .filter(|table| !table.is_empty())
            .ok_or_else(|| {
                LoadError::Configuration("Mapping document does not name a table".to_string())
            })?;

        let mut claims = Claims::default();
        let mut seen_headers = CaseFoldSet::new();
        let mut header_map = Vec::with_capacity(document.map.len());
        for (header, column) in &document.map {
            let column = column.trim();
            if column.is_empty() {
                claims
                    .problems
                    .push(format!("Header '{header}' is mapped to an empty column name"));
                continue;
            }
            if !seen_headers.insert(header.as_str()) {
                claims
                    .problems
                    .push(format!("Header '{header}' is mapped more than once"));
                continue;
            }
            claims.claim(column, MappingCategory::Header, &format!("header '{header}'"));
            header_map.push((header.clone(), column.to_string()));
        }

        let mut synthetics = Vec::with_capacity(document.synthetics.len());
        for (column, literal) in &document.synthetics {
            let Some(literal) = literal_text(literal) else {
                claims.problems.push(format!(
                    "Synthetic column '{column}' must be a string, number, or boolean literal"
                ));
                continue;
            };
            claims.claim(column, MappingCategory::Synthetic, "the mapping document");
            synthetics.push((column.trim().to_string(), literal));
        }

        let timestamps = claims.claim_all(
            &document.timestamps,
            MappingCategory::Timestamp,
            "the mapping document",
        );
        let linenumbers = claims.claim_all(
            &document.linenumbers,
            MappingCategory::LineNumber,
            "the mapping document",
        );
        let uuids = claims.claim_all(
            &document.uuidcolumns,
            MappingCategory::Uuid,
            "the mapping document",
        );
        claims.finish()?;

        Ok(Self {
            table: table.to_string(),
            header_map,
            synthetics,
            timestamps,
            linenumbers,
            uuids,
            ignored: document
                .ignore
                .iter()
                .map(|h| h.trim())
                .filter(|h| !h.is_empty())
                .collect(),
            strict: false,
        })
    }

    /// Merges command-line overrides under the same collision rule.
    pub fn merge(self, overrides: &MappingOverrides) -> LoadResult<Self> {
        let synthetic_pairs = parse_synthetic_specs(&overrides.synthetics)?;
        let mut claims = Claims::seeded(&self);

        let mut merged = self;
        for (column, literal) in synthetic_pairs {
            claims.claim(&column, MappingCategory::Synthetic, "the command line");
            merged.synthetics.push((column, literal));
        }
        merged.timestamps.extend(claims.claim_all(
            &split_column_list(&overrides.timestamps),
            MappingCategory::Timestamp,
            "the command line",
        ));
        merged.linenumbers.extend(claims.claim_all(
            &split_column_list(&overrides.linenumbers),
            MappingCategory::LineNumber,
            "the command line",
        ));
        merged.uuids.extend(claims.claim_all(
            &split_column_list(&overrides.uuids),
            MappingCategory::Uuid,
            "the command line",
        ));
        claims.finish()?;

        if let Some(table) = overrides
            .table
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            merged.table = table.to_string();
        }
        if let Some(strict) = overrides.strict {
            merged.strict = strict;
        }
        Ok(merged)
    }

    /// Records auto-matched header resolutions in the header map.
    pub fn with_header_mappings<I>(mut self, resolved: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (header, column) in resolved {
            if self.header_column(&header).is_none() {
                self.header_map.push((header, column));
            }
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn header_column(&self, header: &str) -> Option<&str> {
        let wanted = fold(header);
        self.header_map
            .iter()
            .find(|(h, _)| fold(h) == wanted)
            .map(|(_, column)| column.as_str())
    }

    pub fn header_mappings(&self) -> &[(String, String)] {
        &self.header_map
    }

    pub fn synthetic(&self, column: &str) -> Option<&str> {
        let wanted = fold(column);
        self.synthetics
            .iter()
            .find(|(c, _)| fold(c) == wanted)
            .map(|(_, literal)| literal.as_str())
    }

    pub fn synthetics(&self) -> &[(String, String)] {
        &self.synthetics
    }

    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    pub fn linenumbers(&self) -> &[String] {
        &self.linenumbers
    }

    pub fn uuids(&self) -> &[String] {
        &self.uuids
    }

    pub fn is_ignored(&self, header: &str) -> bool {
        self.ignored.contains(header)
    }
}

#[derive(Debug, Default)]
struct Claims {
    owners: BTreeMap<String, (MappingCategory, String)>,
    problems: Vec<String>,
}

impl Claims {
    fn seeded(config: &MappingConfiguration) -> Self {
        let mut claims = Claims::default();
        for (header, column) in &config.header_map {
            claims.claim(column, MappingCategory::Header, &format!("header '{header}'"));
        }
        for (column, _) in &config.synthetics {
            claims.claim(column, MappingCategory::Synthetic, "the mapping document");
        }
        let lists = [
            (&config.timestamps, MappingCategory::Timestamp),
            (&config.linenumbers, MappingCategory::LineNumber),
            (&config.uuids, MappingCategory::Uuid),
        ];
        for (columns, category) in lists {
            for column in columns {
                claims.claim(column, category, "the mapping document");
            }
        }
        claims
    }

    fn claim(&mut self, column: &str, category: MappingCategory, origin: &str) {
        let column = column.trim();
        if column.is_empty() {
            self.problems
                .push(format!("Empty column name in {category} from {origin}"));
            return;
        }
        let key = fold(column);
        if let Some((owner, owner_origin)) = self.owners.get(&key) {
            self.problems.push(format!(
                "Column '{column}' is claimed by both {owner} ({owner_origin}) and {category} ({origin})"
            ));
            return;
        }
        self.owners
            .insert(key, (category, origin.to_string()));
    }

    fn claim_all(
        &mut self,
        columns: &[String],
        category: MappingCategory,
        origin: &str,
    ) -> Vec<String> {
        columns
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .filter_map(|column| {
                let before = self.problems.len();
                self.claim(column, category, origin);
                (self.problems.len() == before).then(|| column.to_string())
            })
            .collect()
    }

    fn finish(self) -> LoadResult<()> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MappingPlan(self.problems))
        }
    }
}

fn literal_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null => Some(String::new()),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

/// Parses `column=value[,column=value...]` specs.
pub fn parse_synthetic_specs(specs: &[String]) -> LoadResult<Vec<(String, String)>> {
    specs
        .iter()
        .flat_map(|spec| spec.split(','))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (column, literal) = pair.split_once('=').ok_or_else(|| {
                LoadError::Configuration(format!(
                    "Synthetic override '{pair}' must use the form column=value"
                ))
            })?;
            let column = column.trim();
            if column.is_empty() {
                return Err(LoadError::Configuration(format!(
                    "Synthetic override '{pair}' is missing a column name"
                )));
            }
            Ok((column.to_string(), literal.trim().to_string()))
        })
        .collect()
}

/// Flattens repeated comma-separated column lists. Repeats are kept so the
/// resolver reports them as collisions.
pub fn split_column_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: &str) -> MappingDocument {
        MappingDocument::parse(json).expect("valid mapping JSON")
    }

    fn problems(err: LoadError) -> Vec<String> {
        match err {
            LoadError::MappingPlan(problems) => problems,
            other => panic!("expected mapping plan error, got {other:?}"),
        }
    }

    #[test]
    fn resolves_every_category() {
        let doc = document(
            r#"{"table":"people","map":{"NAME":"name"},"synthetics":{"source":"import","rank":3},
                "timestamps":["loaded_at"],"linenumbers":["line"],"uuidcolumns":["id"],"ignore":["AGE"]}"#,
        );
        let config = resolve(&doc, &MappingOverrides::default()).unwrap();
        assert_eq!(config.table(), "people");
        assert_eq!(config.header_column("name"), Some("name"));
        assert_eq!(config.synthetic("SOURCE"), Some("import"));
        assert_eq!(config.synthetic("rank"), Some("3"));
        assert_eq!(config.timestamps(), ["loaded_at".to_string()]);
        assert_eq!(config.linenumbers(), ["line".to_string()]);
        assert_eq!(config.uuids(), ["id".to_string()]);
        assert!(config.is_ignored("age"));
        assert!(!config.strict());
    }

    #[test]
    fn missing_table_is_a_configuration_error() {
        let err = resolve(&document(r#"{"map":{"A":"a"}}"#), &MappingOverrides::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Configuration(_)));
    }

    #[test]
    fn document_collisions_name_both_claims() {
        let doc = document(r#"{"table":"people","map":{"NAME":"name"},"synthetics":{"name":"x"}}"#);
        let found = problems(resolve(&doc, &MappingOverrides::default()).unwrap_err());
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("map (header 'NAME')"));
        assert!(found[0].contains("synthetics"));
    }

    #[test]
    fn all_document_collisions_are_reported_together() {
        let doc = document(
            r#"{"table":"t","map":{"A":"a","B":"a"},"timestamps":["ts"],"uuidcolumns":["TS","a"]}"#,
        );
        let found = problems(resolve(&doc, &MappingOverrides::default()).unwrap_err());
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn overrides_add_but_never_replace() {
        let doc = document(r#"{"table":"people","map":{"NAME":"name"},"timestamps":["loaded_at"]}"#);
        let overrides = MappingOverrides {
            synthetics: vec!["source=cli, batch=7".to_string()],
            uuids: vec!["id".to_string()],
            table: Some("people_v2".to_string()),
            strict: Some(true),
            ..MappingOverrides::default()
        };
        let config = resolve(&doc, &overrides).unwrap();
        assert_eq!(config.table(), "people_v2");
        assert_eq!(config.synthetic("batch"), Some("7"));
        assert_eq!(config.uuids(), ["id".to_string()]);
        assert!(config.strict());

        let clash = MappingOverrides {
            linenumbers: vec!["LOADED_AT".to_string()],
            ..MappingOverrides::default()
        };
        let found = problems(resolve(&doc, &clash).unwrap_err());
        assert!(found[0].contains("timestamps (the mapping document)"));
        assert!(found[0].contains("linenumbers (the command line)"));
    }

    #[test]
    fn document_errors_are_reported_before_overrides_are_merged() {
        let doc = document(r#"{"table":"t","map":{"A":"a"},"synthetics":{"a":"1"}}"#);
        let overrides = MappingOverrides {
            synthetics: vec!["broken".to_string()],
            ..MappingOverrides::default()
        };
        assert!(matches!(
            resolve(&doc, &overrides).unwrap_err(),
            LoadError::MappingPlan(_)
        ));
    }

    #[test]
    fn repeated_columns_collide_from_either_source() {
        let doc = document(r#"{"table":"t","timestamps":["ts","TS"]}"#);
        let found = problems(resolve(&doc, &MappingOverrides::default()).unwrap_err());
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("Column 'TS' is claimed by both timestamps"));

        let doc = document(r#"{"table":"t"}"#);
        let overrides = MappingOverrides {
            timestamps: vec!["ts".to_string(), "TS".to_string()],
            uuids: vec!["id, id".to_string()],
            ..MappingOverrides::default()
        };
        let found = problems(resolve(&doc, &overrides).unwrap_err());
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("Column 'TS' is claimed by both timestamps (the command line)"));
        assert!(found[1].contains("Column 'id' is claimed by both uuidcolumns (the command line)"));
    }

    #[test]
    fn malformed_synthetic_override_is_rejected() {
        let err = parse_synthetic_specs(&["=value".to_string()]).unwrap_err();
        assert!(matches!(err, LoadError::Configuration(_)));
        assert!(parse_synthetic_specs(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn header_write_back_keeps_existing_entries() {
        let doc = document(r#"{"table":"t","map":{"A":"a"}}"#);
        let config = resolve(&doc, &MappingOverrides::default())
            .unwrap()
            .with_header_mappings([
                ("age".to_string(), "age".to_string()),
                ("a".to_string(), "other".to_string()),
            ]);
        assert_eq!(config.header_column("AGE"), Some("age"));
        assert_eq!(config.header_column("A"), Some("a"));
    }
}
