//! # 着色 Petri 网（Colored Petri Net）
//!
//! 网由库所、迁移、输入弧（库所 → 迁移，可带守卫）、输出弧（迁移 → 库所，可带
//! 颜色生成表达式）以及驻留在库所中的带颜色 token 组成。
//!
//! * [`NetDefinition`] 是可序列化的静态描述，支持 JSON 与 RON；
//! * 运行时图在 [`crate::runner::Runner`] 构造时由定义建立，之后只有 token 归属变化。
//!
//! ## 示例
//!
//! ```rust
//! use rustcpn::net::{Color, NetDefinition};
//!
//! let net = NetDefinition::empty()
//!     .place("p1")
//!     .place("p2")
//!     .transition("t1")
//!     .guarded_arc("p1", "t1", r#"color == "foobar""#)
//!     .producing_arc("t1", "p2", "42")
//!     .token("a", "p1", "foobar");
//!
//! let json = rustcpn::net::io::to_json_string(&net).unwrap();
//! let back: NetDefinition = rustcpn::net::io::from_json_str(&json).unwrap();
//! assert_eq!(back, net);
//! assert_eq!(back.tokens[0].color, Color::from("foobar"));
//! ```
pub(crate) mod builder;
pub mod color;
pub mod definition;
pub mod ids;
pub mod index_vec;
pub mod io;

pub use builder::{BuildError, DiagnosticReport};
pub use color::Color;
pub use definition::{InputArc, NetDefinition, OutputArc, Place, Token, Transition};
pub use ids::{FireId, PlaceId, TokenId, TransitionId};
