//! Parameter struct to predicate/assignment mapping.
//!
//! Every parameter type declares a static table of field descriptors, one per
//! field, parsed from a tag of the form `"column[,operator]"`:
//!
//! - `"-"` excludes the field entirely
//! - `"age,>"` filters with `age > ?`
//! - `"id,in"` filters with `id IN (...)`
//! - `""` or `",="` uses the field name and equality
//!
//! Read paths (SELECT/UPDATE/DELETE filters) keep the operator in the map key
//! (`"age >"`); write paths (INSERT/UPDATE assignments) always use the bare column.

use crate::models::Value;
use std::collections::BTreeMap;

/// Column-expression to value mapping consumed by the SQL compiler.
pub type PredicateMap = BTreeMap<String, Value>;

/// Static description of one parameter struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Declared Rust field name
    pub name: &'static str,
    /// Column name; falls back to the field name when the tag leaves it empty
    pub column: &'static str,
    /// Comparison operator; `None` means equality
    pub operator: Option<&'static str>,
    /// Set by the `"-"` tag
    pub skip: bool,
    predicate_key: String,
}

impl FieldDescriptor {
    /// Parse a field tag.
    pub fn from_tag(name: &'static str, tag: &'static str) -> Self {
        if tag == "-" {
            return Self {
                name,
                column: name,
                operator: None,
                skip: true,
                predicate_key: name.to_string(),
            };
        }

        let (column, operator) = match tag.split_once(',') {
            Some((column, operator)) => (column.trim(), operator.trim()),
            None => (tag.trim(), ""),
        };
        let column = if column.is_empty() { name } else { column };
        let operator = match operator {
            "" | "=" => None,
            op => Some(op),
        };
        let predicate_key = match operator {
            Some(op) => format!("{} {}", column, op),
            None => column.to_string(),
        };

        Self {
            name,
            column,
            operator,
            skip: false,
            predicate_key,
        }
    }

    /// Map key for this field: `"column op"` for predicates, the bare column otherwise.
    pub fn key(&self, ignore_operator: bool) -> &str {
        if ignore_operator {
            self.column
        } else {
            &self.predicate_key
        }
    }
}

/// A parameter shape usable as a filter or as assignment data.
///
/// Implement with [`impl_params!`](crate::impl_params) rather than by hand.
pub trait Params {
    /// Field descriptors, in declaration order. Built once per type.
    fn descriptors() -> &'static [FieldDescriptor];

    /// Current field values, aligned with [`Params::descriptors`].
    /// `None` marks an unset field.
    fn values(&self) -> Vec<Option<Value>>;
}

/// Convert a parameter value into a column-expression → value map.
///
/// `None` input yields an empty map, which compiles to "no filter".
/// When several set fields produce the same key, the one declared last wins.
pub fn map_to_predicates<P: Params>(value: Option<&P>, ignore_operator: bool) -> PredicateMap {
    let mut map = PredicateMap::new();
    let Some(value) = value else {
        return map;
    };

    for (field, current) in P::descriptors().iter().zip(value.values()) {
        if field.skip {
            continue;
        }
        let Some(current) = current else {
            continue;
        };
        if !ignore_operator && current.is_empty_list() {
            continue;
        }
        map.insert(field.key(ignore_operator).to_string(), current);
    }

    map
}

/// Predicates for a read filter.
pub fn to_where<P: Params>(value: Option<&P>) -> PredicateMap {
    map_to_predicates(value, false)
}

/// Assignments for INSERT/UPDATE.
pub fn to_assign<P: Params>(value: &P) -> PredicateMap {
    map_to_predicates(Some(value), true)
}

/// Assignments for a multi-row INSERT.
pub fn to_assign_list<P: Params>(values: &[P]) -> Vec<PredicateMap> {
    values.iter().map(to_assign).collect()
}

/// Implement [`Params`] for a struct by tagging each field.
///
/// Every listed field's type must implement [`ToArg`](crate::models::ToArg);
/// use `Option<T>` for fields that may be left unset.
///
/// ```ignore
/// impl_params!(StudentParam {
///     id => "id",
///     ids => "id,in",
///     min_status => "status,>=",
///     name => "name",
///     note => "-",
/// });
/// ```
#[macro_export]
macro_rules! impl_params {
    ($ty:ident { $($field:ident => $tag:literal),+ $(,)? }) => {
        impl $crate::mapper::Params for $ty {
            fn descriptors() -> &'static [$crate::mapper::FieldDescriptor] {
                static FIELDS: ::std::sync::LazyLock<::std::vec::Vec<$crate::mapper::FieldDescriptor>> =
                    ::std::sync::LazyLock::new(|| {
                        ::std::vec![
                            $( $crate::mapper::FieldDescriptor::from_tag(stringify!($field), $tag), )+
                        ]
                    });
                &FIELDS
            }

            fn values(&self) -> ::std::vec::Vec<::std::option::Option<$crate::models::Value>> {
                ::std::vec![
                    $( $crate::models::ToArg::to_arg(&self.$field), )+
                ]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone)]
    #[allow(non_snake_case)]
    struct StudentParam {
        id: Option<i64>,
        ids: Vec<i64>,
        min_status: Option<i32>,
        name: Option<String>,
        note: Option<String>,
        Untagged: Option<bool>,
    }

    impl_params!(StudentParam {
        id => "id",
        ids => "id,in",
        min_status => "status, >=",
        name => "name,=",
        note => "-",
        Untagged => "",
    });

    #[test]
    fn test_tag_parsing() {
        let d = FieldDescriptor::from_tag("age", "age,>");
        assert_eq!(d.column, "age");
        assert_eq!(d.operator, Some(">"));
        assert_eq!(d.key(false), "age >");
        assert_eq!(d.key(true), "age");

        let d = FieldDescriptor::from_tag("Name", ",like");
        assert_eq!(d.column, "Name");
        assert_eq!(d.key(false), "Name like");

        let d = FieldDescriptor::from_tag("id", "id,");
        assert_eq!(d.operator, None);
        assert_eq!(d.key(false), "id");

        assert!(FieldDescriptor::from_tag("secret", "-").skip);
    }

    #[test]
    fn test_none_yields_empty_map() {
        assert!(to_where::<StudentParam>(None).is_empty());
    }

    #[test]
    fn test_unset_fields_are_excluded() {
        let param = StudentParam {
            id: Some(1),
            ..Default::default()
        };
        let map = to_where(Some(&param));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("id"), Some(&Value::Int(1)));
        assert!(!map.contains_key("name"));
    }

    #[test]
    fn test_operator_keys_only_on_predicate_side() {
        let param = StudentParam {
            ids: vec![1, 2],
            min_status: Some(2),
            ..Default::default()
        };
        let wheres = to_where(Some(&param));
        assert_eq!(
            wheres.get("id in"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(wheres.get("status >="), Some(&Value::Int(2)));

        let assigns = to_assign(&param);
        assert!(assigns.contains_key("id"));
        assert_eq!(assigns.get("status"), Some(&Value::Int(2)));
        assert!(!assigns.contains_key("status >="));
    }

    #[test]
    fn test_empty_list_excluded_from_predicates_but_assigned() {
        let param = StudentParam::default();
        assert!(!to_where(Some(&param)).contains_key("id in"));
        assert_eq!(to_assign(&param).get("id"), Some(&Value::List(vec![])));
    }

    #[test]
    fn test_skip_tag_and_field_name_fallback() {
        let param = StudentParam {
            note: Some("hidden".into()),
            Untagged: Some(true),
            ..Default::default()
        };
        let map = to_where(Some(&param));
        assert!(!map.values().any(|v| v == &Value::String("hidden".into())));
        assert_eq!(map.get("Untagged"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let param = StudentParam {
            id: Some(9),
            ids: vec![3],
            name: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(to_where(Some(&param)), to_where(Some(&param)));
        assert_eq!(to_assign(&param), to_assign(&param));
    }

    #[test]
    fn test_assign_list_preserves_order() {
        let rows = vec![
            StudentParam {
                name: Some("first".into()),
                min_status: Some(1),
                ..Default::default()
            },
            StudentParam {
                name: Some("second".into()),
                min_status: Some(2),
                ..Default::default()
            },
        ];
        let list = to_assign_list(&rows);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].get("name"), Some(&Value::String("first".into())));
        assert_eq!(list[0].get("status"), Some(&Value::Int(1)));
        assert_eq!(list[1].get("name"), Some(&Value::String("second".into())));
        assert_eq!(list[1].get("status"), Some(&Value::Int(2)));
    }

    #[derive(Debug, Default)]
    struct RenameParam {
        title: Option<String>,
        label: Option<String>,
    }

    impl_params!(RenameParam {
        title => "name",
        label => "name",
    });

    #[test]
    fn test_shared_column_keeps_last_declared_field() {
        let both = RenameParam {
            title: Some("title".into()),
            label: Some("label".into()),
        };
        assert_eq!(
            to_assign(&both).get("name"),
            Some(&Value::String("label".into()))
        );
        assert_eq!(to_where(Some(&both)).len(), 1);

        let first_only = RenameParam {
            title: Some("title".into()),
            label: None,
        };
        assert_eq!(
            to_assign(&first_only).get("name"),
            Some(&Value::String("title".into()))
        );

        // A list field is always set, so it shadows the scalar on the write side.
        let param = StudentParam {
            id: Some(1),
            ..Default::default()
        };
        assert_eq!(to_assign(&param).get("id"), Some(&Value::List(vec![])));
        assert_eq!(to_where(Some(&param)).get("id"), Some(&Value::Int(1)));
    }
}
