//! Configuration shapes and their validator
//!
//! A [`Shape`] describes the legal structure of a step's raw configuration.
//! Shapes are checked when the manifest loads, never while steps run.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;

/// Legal structure of a raw configuration value
///
/// In YAML descriptors a shape is written in singleton-map form:
/// `string`, `{list: string}`, `{map: boolean}`,
/// `{one-of: [string, {record: [...]}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    /// Anything, including null
    Any,
    String,
    Boolean,
    Integer,
    /// Sequence whose items all match the inner shape
    List(Box<Shape>),
    /// Mapping from string keys to values of the inner shape
    Map(Box<Shape>),
    /// Mapping with a fixed set of known keys
    Record(Vec<Field>),
    /// Value matching at least one alternative
    OneOf(Vec<Shape>),
    /// String from a fixed set
    Choice(Vec<String>),
}

/// A key of a [`Shape::Record`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Accepted spellings; a required field needs at least one of them
    pub keys: Vec<String>,
    #[serde(default)]
    pub required: bool,
    pub shape: Shape,
}

impl Field {
    /// A field that must be present
    pub fn required(key: &str, shape: Shape) -> Self {
        Self {
            keys: vec![key.to_string()],
            required: true,
            shape,
        }
    }

    /// A field that may be omitted
    pub fn optional(key: &str, shape: Shape) -> Self {
        Self {
            keys: vec![key.to_string()],
            required: false,
            shape,
        }
    }

    /// A required field with several accepted keys, at least one present
    pub fn any_of(keys: &[&str], shape: Shape) -> Self {
        Self {
            keys: keys.iter().map(ToString::to_string).collect(),
            required: true,
            shape,
        }
    }
}

/// Where and why a value failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Path into the value, e.g. `$[2].target`
    pub location: String,
    pub reason: String,
}

impl Shape {
    pub fn list_of(inner: Shape) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn map_of(inner: Shape) -> Self {
        Self::Map(Box::new(inner))
    }

    pub fn choice(options: &[&str]) -> Self {
        Self::Choice(options.iter().map(ToString::to_string).collect())
    }

    /// Validate a raw value against this shape
    pub fn validate(&self, value: &Value) -> Result<(), Mismatch> {
        self.check(value, "$")
    }

    fn check(&self, value: &Value, location: &str) -> Result<(), Mismatch> {
        if let Value::Tagged(tagged) = value {
            return self.check(&tagged.value, location);
        }

        match self {
            Self::Any => Ok(()),
            Self::String => expect(value.is_string(), value, location),
            Self::Boolean => expect(value.is_bool(), value, location),
            Self::Integer => expect(value.is_i64() || value.is_u64(), value, location),
            Self::Choice(options) => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => Ok(()),
                Some(s) => Err(Mismatch {
                    location: location.to_string(),
                    reason: format!("'{s}' is not an accepted value"),
                }),
                None => expect(false, value, location),
            },
            Self::List(inner) => {
                let Some(items) = value.as_sequence() else {
                    return expect(false, value, location);
                };
                for (i, item) in items.iter().enumerate() {
                    inner.check(item, &format!("{location}[{i}]"))?;
                }
                Ok(())
            }
            Self::Map(inner) => {
                let Some(mapping) = value.as_mapping() else {
                    return expect(false, value, location);
                };
                for (key, item) in mapping {
                    let key = string_key(key, location)?;
                    inner.check(item, &format!("{location}.{key}"))?;
                }
                Ok(())
            }
            Self::Record(fields) => check_record(fields, value, location),
            Self::OneOf(alternatives) => {
                if alternatives.iter().any(|a| a.check(value, location).is_ok()) {
                    Ok(())
                } else {
                    Err(Mismatch {
                        location: location.to_string(),
                        reason: format!("{} matches none of the alternatives", describe(value)),
                    })
                }
            }
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneOf(_) => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

fn check_record(fields: &[Field], value: &Value, location: &str) -> Result<(), Mismatch> {
    let Some(mapping) = value.as_mapping() else {
        return expect(false, value, location);
    };

    for (key, item) in mapping {
        let key = string_key(key, location)?;
        let Some(field) = fields.iter().find(|f| f.keys.iter().any(|k| k == key)) else {
            return Err(Mismatch {
                location: location.to_string(),
                reason: format!("unexpected key '{key}'"),
            });
        };
        field.shape.check(item, &format!("{location}.{key}"))?;
    }

    for field in fields.iter().filter(|f| f.required) {
        let present = field
            .keys
            .iter()
            .any(|k| mapping.contains_key(Value::String(k.clone())));
        if !present {
            return Err(Mismatch {
                location: location.to_string(),
                reason: format!("missing key '{}'", field.keys.join("' or '")),
            });
        }
    }

    Ok(())
}

fn string_key<'v>(key: &'v Value, location: &str) -> Result<&'v str, Mismatch> {
    key.as_str().ok_or_else(|| Mismatch {
        location: location.to_string(),
        reason: format!("keys must be strings, found {}", describe(key)),
    })
}

fn expect(ok: bool, value: &Value, location: &str) -> Result<(), Mismatch> {
    if ok {
        Ok(())
    } else {
        Err(Mismatch {
            location: location.to_string(),
            reason: format!("found {}", describe(value)),
        })
    }
}

/// Short description of a value's kind for error messages
fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any value"),
            Self::String => write!(f, "string"),
            Self::Boolean => write!(f, "boolean"),
            Self::Integer => write!(f, "integer"),
            Self::List(inner) => {
                write!(f, "list of ")?;
                inner.fmt_nested(f)
            }
            Self::Map(inner) => {
                write!(f, "mapping of string to ")?;
                inner.fmt_nested(f)
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let marker = if field.required { "" } else { "?" };
                    write!(f, "{}{marker}: ", field.keys.join("|"))?;
                    field.shape.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Self::OneOf(alternatives) => {
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    alternative.fmt_nested(f)?;
                }
                Ok(())
            }
            Self::Choice(options) => write!(f, "one of [{}]", options.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn flatpak_shape() -> Shape {
        Shape::list_of(Shape::OneOf(vec![
            Shape::String,
            Shape::Record(vec![
                Field::any_of(&["bundle", "from"], Shape::String),
                Field::optional("target", Shape::choice(&["system", "user"])),
                Field::optional("runtime", Shape::String),
            ]),
        ]))
    }

    #[test]
    fn test_primitives() {
        assert!(Shape::String.validate(&yaml("hello")).is_ok());
        assert!(Shape::String.validate(&yaml("[a]")).is_err());
        assert!(Shape::Boolean.validate(&yaml("true")).is_ok());
        assert!(Shape::Integer.validate(&yaml("42")).is_ok());
        assert!(Shape::Integer.validate(&yaml("4.2")).is_err());
        assert!(Shape::Any.validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_list_reports_index() {
        let shape = Shape::list_of(Shape::String);
        assert!(shape.validate(&yaml("[a, b]")).is_ok());

        let err = shape.validate(&yaml("[a, 3]")).unwrap_err();
        assert_eq!(err.location, "$[1]");
        assert_eq!(err.reason, "found a number");
    }

    #[test]
    fn test_null_is_not_a_list() {
        let err = Shape::list_of(Shape::String)
            .validate(&Value::Null)
            .unwrap_err();
        assert_eq!(err.reason, "found null");
    }

    #[test]
    fn test_map_of_strings() {
        let shape = Shape::map_of(Shape::String);
        assert!(shape.validate(&yaml("{a: b, c: d}")).is_ok());

        let err = shape.validate(&yaml("{a: [b]}")).unwrap_err();
        assert_eq!(err.location, "$.a");
    }

    #[test]
    fn test_record_keys() {
        let shape = flatpak_shape();
        assert!(
            shape
                .validate(&yaml("[org.gnome.Maps, {from: x.flatpakref, target: user}]"))
                .is_ok()
        );
        assert!(shape.validate(&yaml("[{bundle: app.flatpak}]")).is_ok());

        // Neither bundle nor from
        assert!(shape.validate(&yaml("[{target: user}]")).is_err());

        let record = Shape::Record(vec![
            Field::any_of(&["bundle", "from"], Shape::String),
            Field::optional("target", Shape::choice(&["system", "user"])),
        ]);
        let err = record.validate(&yaml("{target: user}")).unwrap_err();
        assert_eq!(err.reason, "missing key 'bundle' or 'from'");

        let err = record.validate(&yaml("{bundle: a, colour: red}")).unwrap_err();
        assert_eq!(err.reason, "unexpected key 'colour'");

        let err = record.validate(&yaml("{bundle: a, target: world}")).unwrap_err();
        assert_eq!(err.location, "$.target");
        assert_eq!(err.reason, "'world' is not an accepted value");
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::list_of(Shape::String).to_string(), "list of string");
        assert_eq!(
            Shape::map_of(Shape::String).to_string(),
            "mapping of string to string"
        );
        assert_eq!(
            flatpak_shape().to_string(),
            "list of (string | {bundle|from: string, target?: one of [system, user], runtime?: string})"
        );
    }

    #[test]
    fn test_deserialize_singleton_map_form() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(with = "serde_yaml::with::singleton_map_recursive")]
            schema: Shape,
        }

        let holder: Holder = serde_yaml::from_str("schema: {list: string}").unwrap();
        assert_eq!(holder.schema, Shape::list_of(Shape::String));

        let holder: Holder = serde_yaml::from_str(
            "schema:\n  one-of:\n    - string\n    - record:\n        - keys: [name]\n          required: true\n          shape: string\n",
        )
        .unwrap();
        assert_eq!(
            holder.schema,
            Shape::OneOf(vec![
                Shape::String,
                Shape::Record(vec![Field::required("name", Shape::String)]),
            ])
        );
    }
}
