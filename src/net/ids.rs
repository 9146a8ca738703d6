//! 标识符：对外的字符串 ID 与运行时图内部的稠密索引。
use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::index_vec::Idx;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, stringify!($name))?;
                f.debug_tuple("").field(&self.0).finish()
            }
        }

        impl Idx for $name {
            fn index(self) -> usize {
                self.0 as usize
            }

            fn from_usize(idx: usize) -> Self {
                Self(idx as u32)
            }
        }
    };
}

/// 不透明的字符串标识，按字典序比较；快照输出与 `fire_any` 的选择都按此顺序。
macro_rules! define_key {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(PlaceIdx);
define_id!(TransitionIdx);
define_id!(InputArcIdx);
define_id!(OutputArcIdx);

define_key!(PlaceId);
define_key!(TransitionId);
define_key!(TokenId);
define_key!(FireId);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn keys_order_lexicographically() {
        let mut ids = vec![
            TransitionId::from("t10"),
            TransitionId::from("t2"),
            TransitionId::from("t1"),
        ];
        ids.sort();
        let raw = ids.iter().map(TransitionId::as_str).collect::<Vec<_>>();
        assert_eq!(raw, vec!["t1", "t10", "t2"]);
    }

    #[test]
    fn keys_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(PlaceId::from("p1"), 1);
        assert_eq!(map.get("p1"), Some(&1));
    }

    #[test]
    fn keys_serialize_as_plain_strings() {
        let json = serde_json::to_string(&TokenId::from("tk")).unwrap();
        assert_eq!(json, "\"tk\"");
        assert_eq!(format!("{:?}", PlaceIdx::new(3)), "PlaceIdx(3)");
    }
}
