//! 颜色（token 携带的结构化值）。
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// token 携带的值：守卫读取它，生产表达式计算它；引擎不对其结构做约束。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Color>),
    Map(BTreeMap<String, Color>),
}

impl Color {
    pub fn type_name(&self) -> &'static str {
        match self {
            Color::Null => "nil",
            Color::Bool(_) => "bool",
            Color::Int(_) => "int",
            Color::Float(_) => "float",
            Color::String(_) => "string",
            Color::List(_) => "list",
            Color::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Color::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Color::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Color::Int(i) => Some(*i as f64),
            Color::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Color::String(s) => Some(s),
            _ => None,
        }
    }

    /// 结构相等，`Int(1)` 与 `Float(1.0)` 视为相等。
    pub fn loose_eq(&self, other: &Color) -> bool {
        match (self, other) {
            (Color::Int(a), Color::Float(b)) | (Color::Float(b), Color::Int(a)) => {
                (*a as f64) == *b
            }
            (Color::List(a), Color::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Color::Map(a), Color::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Null => write!(f, "nil"),
            Color::Bool(b) => write!(f, "{}", b),
            Color::Int(i) => write!(f, "{}", i),
            Color::Float(x) => write!(f, "{:?}", x),
            Color::String(s) => write!(f, "{:?}", s),
            Color::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Color::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Color {
    fn from(value: bool) -> Self {
        Color::Bool(value)
    }
}

impl From<i64> for Color {
    fn from(value: i64) -> Self {
        Color::Int(value)
    }
}

impl From<f64> for Color {
    fn from(value: f64) -> Self {
        Color::Float(value)
    }
}

impl From<&str> for Color {
    fn from(value: &str) -> Self {
        Color::String(value.to_owned())
    }
}

impl From<String> for Color {
    fn from(value: String) -> Self {
        Color::String(value)
    }
}

impl From<Vec<Color>> for Color {
    fn from(value: Vec<Color>) -> Self {
        Color::List(value)
    }
}

impl From<BTreeMap<String, Color>> for Color {
    fn from(value: BTreeMap<String, Color>) -> Self {
        Color::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_load_into_variants() {
        let color: Color =
            serde_json::from_str(r#"{"hi": "foobar", "n": 42, "x": 0.5, "l": [true, null]}"#)
                .unwrap();
        let Color::Map(map) = color else {
            panic!("expected a map");
        };
        assert_eq!(map["hi"], Color::from("foobar"));
        assert_eq!(map["n"], Color::Int(42));
        assert_eq!(map["x"], Color::Float(0.5));
        assert_eq!(map["l"], Color::List(vec![Color::Bool(true), Color::Null]));
    }

    #[test]
    fn integers_stay_integers_on_output() {
        assert_eq!(serde_json::to_string(&Color::Int(84)).unwrap(), "84");
        assert_eq!(serde_json::to_string(&Color::Null).unwrap(), "null");
    }

    #[test]
    fn loose_equality_crosses_number_kinds() {
        assert!(Color::Int(1).loose_eq(&Color::Float(1.0)));
        assert!(!Color::Int(1).loose_eq(&Color::from("1")));
        assert!(Color::List(vec![Color::Int(2)]).loose_eq(&Color::List(vec![Color::Float(2.0)])));
    }

    #[test]
    fn display_is_compact() {
        let color = Color::List(vec![Color::Int(1), Color::from("a"), Color::Null]);
        assert_eq!(color.to_string(), r#"[1, "a", nil]"#);
    }
}
