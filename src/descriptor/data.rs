//! Free-form template data attached to a descriptor.
//!
//! The `data` section of a descriptor may hold strings, lists of strings,
//! or nested mappings of those. Scalars that YAML reads as numbers or
//! booleans are kept as their string form.

use crate::error::PackagingError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A value in the template data bag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub enum TemplateValue {
    String(String),
    List(Vec<String>),
    Map(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Human-readable name of the variant, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateValue::String(_) => "string",
            TemplateValue::List(_) => "list",
            TemplateValue::Map(_) => "mapping",
        }
    }

    pub fn as_list(&self, key: &str) -> Result<&[String], PackagingError> {
        match self {
            TemplateValue::List(items) => Ok(items),
            other => Err(mismatch(key, "list", other)),
        }
    }
}

fn mismatch(key: &str, expected: &'static str, found: &TemplateValue) -> PackagingError {
    PackagingError::DataBagTypeMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

impl TryFrom<serde_yaml::Value> for TemplateValue {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value;

        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(scalar_to_string)
                .collect::<Result<Vec<_>, _>>()
                .map(TemplateValue::List),
            Value::Mapping(mapping) => {
                let mut map = BTreeMap::new();
                for (key, value) in mapping {
                    let key = scalar_to_string(key)?;
                    map.insert(key, TemplateValue::try_from(value)?);
                }
                Ok(TemplateValue::Map(map))
            }
            Value::Tagged(tagged) => Err(format!(
                "tagged value '{}' is not supported in template data",
                tagged.tag
            )),
            scalar => scalar_to_string(scalar).map(TemplateValue::String),
        }
    }
}

fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value;

    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err("null is not a valid template data value".to_string()),
        Value::Sequence(_) => {
            Err("template data lists may only contain strings, not nested lists".to_string())
        }
        Value::Mapping(_) => {
            Err("template data lists may only contain strings, not mappings".to_string())
        }
        Value::Tagged(tagged) => Err(format!(
            "tagged value '{}' is not supported in template data",
            tagged.tag
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<BTreeMap<String, TemplateValue>, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn scalars_lists_and_maps() {
        let data = parse(
            "configure: [--prefix=/usr, --disable-static]\n\
             jobs: 4\n\
             paths:\n  man: usr/share/man\n",
        )
        .unwrap();

        assert_eq!(
            data["configure"].as_list("configure").unwrap(),
            ["--prefix=/usr", "--disable-static"]
        );
        assert_eq!(data["jobs"], TemplateValue::String("4".into()));
        assert_eq!(
            data["paths"],
            TemplateValue::Map(BTreeMap::from([(
                "man".to_string(),
                TemplateValue::String("usr/share/man".into())
            )]))
        );
    }

    #[test]
    fn accessor_reports_named_mismatch() {
        let data = parse("configure: --prefix=/usr\n").unwrap();
        let err = data["configure"].as_list("configure").unwrap_err();
        assert_eq!(
            err,
            PackagingError::DataBagTypeMismatch {
                key: "configure".into(),
                expected: "list",
                found: "string",
            }
        );
    }

    #[test]
    fn rejects_null_and_nested_lists() {
        assert!(parse("x: ~\n").is_err());
        assert!(parse("x: [[a]]\n").is_err());
    }
}
