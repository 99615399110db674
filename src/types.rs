//! Declared column types of the target store.
//!
//! [`ColumnType`] is a closed tagged union over the store's type names. Scalar
//! kinds map one-to-one onto a conversion routine in [`crate::data`];
//! collection kinds carry their element, key, and value types. Anything the
//! loader cannot write lands in [`ColumnType::Unsupported`] so the converter
//! can refuse it explicitly instead of guessing.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow, bail, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Ascii,
    Text,
    Varchar,
    Int,
    BigInt,
    Float,
    Double,
    Varint,
    Decimal,
    Boolean,
    Timestamp,
    Blob,
    Uuid,
    TimeUuid,
    List(Box<ColumnType>),
    Set(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Unsupported(String),
}

impl ColumnType {
    pub fn as_str(&self) -> &str {
        match self {
            ColumnType::Ascii => "ascii",
            ColumnType::Text => "text",
            ColumnType::Varchar => "varchar",
            ColumnType::Int => "int",
            ColumnType::BigInt => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Varint => "varint",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Blob => "blob",
            ColumnType::Uuid => "uuid",
            ColumnType::TimeUuid => "timeuuid",
            ColumnType::List(_) => "list",
            ColumnType::Set(_) => "set",
            ColumnType::Map(_, _) => "map",
            ColumnType::Unsupported(name) => name.as_str(),
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "ascii",
            "text",
            "varchar",
            "int",
            "bigint",
            "float",
            "double",
            "varint",
            "decimal",
            "boolean",
            "timestamp",
            "blob",
            "uuid",
            "timeuuid",
            "list<T>",
            "set<T>",
            "map<K,V>",
        ]
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            ColumnType::Ascii | ColumnType::Text | ColumnType::Varchar
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::List(element) => write!(f, "list<{element}>"),
            ColumnType::Set(element) => write!(f, "set<{element}>"),
            ColumnType::Map(key, value) => write!(f, "map<{key}, {value}>"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        ensure!(!trimmed.is_empty(), "Column type cannot be empty");

        let Some(open) = trimmed.find('<') else {
            return Ok(parse_scalar(trimmed));
        };
        ensure!(
            trimmed.ends_with('>'),
            "Column type '{trimmed}' must close its parameters with '>'"
        );
        let name = trimmed[..open].trim().to_ascii_lowercase();
        let params = split_type_parameters(&trimmed[open + 1..trimmed.len() - 1])?;

        match (name.as_str(), params.as_slice()) {
            ("frozen", [inner]) => inner.parse(),
            ("list", [element]) => Ok(ColumnType::List(Box::new(element.parse()?))),
            ("set", [element]) => Ok(ColumnType::Set(Box::new(element.parse()?))),
            ("map", [key, value]) => Ok(ColumnType::Map(
                Box::new(key.parse()?),
                Box::new(value.parse()?),
            )),
            ("list" | "set" | "frozen", _) => {
                bail!("Column type '{trimmed}' expects exactly one type parameter")
            }
            ("map", _) => bail!("Column type '{trimmed}' expects key and value type parameters"),
            _ => Ok(ColumnType::Unsupported(trimmed.to_ascii_lowercase())),
        }
    }
}

fn parse_scalar(token: &str) -> ColumnType {
    let normalized = token.to_ascii_lowercase();
    match normalized.as_str() {
        "ascii" => ColumnType::Ascii,
        "text" => ColumnType::Text,
        "varchar" => ColumnType::Varchar,
        "int" => ColumnType::Int,
        "bigint" => ColumnType::BigInt,
        "float" => ColumnType::Float,
        "double" => ColumnType::Double,
        "varint" => ColumnType::Varint,
        "decimal" => ColumnType::Decimal,
        "boolean" => ColumnType::Boolean,
        "timestamp" => ColumnType::Timestamp,
        "blob" => ColumnType::Blob,
        "uuid" => ColumnType::Uuid,
        "timeuuid" => ColumnType::TimeUuid,
        _ => ColumnType::Unsupported(normalized),
    }
}

/// Splits `a, map<b, c>` into `["a", "map<b, c>"]`, honouring nesting.
fn split_type_parameters(inner: &str) -> Result<Vec<&str>> {
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("Unbalanced '>' in type parameters '{inner}'"))?;
            }
            ',' if depth == 0 => {
                params.push(inner[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    ensure!(depth == 0, "Unbalanced '<' in type parameters '{inner}'");
    params.push(inner[start..].trim());
    ensure!(
        params.iter().all(|param| !param.is_empty()),
        "Empty type parameter in '{inner}'"
    );
    Ok(params)
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_case_insensitively() {
        assert_eq!("TEXT".parse::<ColumnType>().unwrap(), ColumnType::Text);
        assert_eq!(" bigint ".parse::<ColumnType>().unwrap(), ColumnType::BigInt);
        assert_eq!(
            "timeuuid".parse::<ColumnType>().unwrap(),
            ColumnType::TimeUuid
        );
    }

    #[test]
    fn parses_nested_collections() {
        let parsed: ColumnType = "map<text, frozen<list<int>>>".parse().unwrap();
        assert_eq!(
            parsed,
            ColumnType::Map(
                Box::new(ColumnType::Text),
                Box::new(ColumnType::List(Box::new(ColumnType::Int)))
            )
        );
        assert_eq!(parsed.to_string(), "map<text, list<int>>");
    }

    #[test]
    fn unknown_names_become_unsupported() {
        assert_eq!(
            "inet".parse::<ColumnType>().unwrap(),
            ColumnType::Unsupported("inet".to_string())
        );
        assert_eq!(
            "tuple<int, text>".parse::<ColumnType>().unwrap(),
            ColumnType::Unsupported("tuple<int, text>".to_string())
        );
    }

    #[test]
    fn rejects_malformed_parameters() {
        assert!("list<int".parse::<ColumnType>().is_err());
        assert!("map<text>".parse::<ColumnType>().is_err());
        assert!("list<>".parse::<ColumnType>().is_err());
        assert!("".parse::<ColumnType>().is_err());
    }

    #[test]
    fn serde_round_trips_through_type_text() {
        let ty = ColumnType::Set(Box::new(ColumnType::Uuid));
        let yaml = serde_yaml::to_string(&ty).unwrap();
        let back: ColumnType = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, ty);
    }
}
