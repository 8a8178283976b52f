//! Dynamic SQL parsing and the named-SQL registry for SQLMapper Rust.
//!
//! `sqlmapper-parse` is the **resolution layer**. Sources are parsed once into
//! an immutable node tree and rendered per call into SQL plus ordered binds.
//!
//! # Front-ends
//!
//! - **Raw dynamic SQL** ([`DynamicParserFactory::create`]): SQL text with
//!   inline `<if>`, `<choose>`, `<foreach>`, `<where>`, `<set>`, `<trim>` and
//!   `<bind>` directives; `#{path}` / `:path` bind, `${path}` inlines a literal.
//! - **Mapper documents** ([`DynamicParserFactory`] via
//!   [`ParserFactory::parse_document`]): `<mapper namespace="..">` XML with
//!   `<select|insert|update|delete|sql>` statements and `<include refid>`.
//! - **Templates** ([`TemplateParserFactory`]): `{{ }}` actions and
//!   `{{define "id"}}` documents.
//!
//! [`SqlManager`] maps ids to parsed templates for one factory.

pub mod dynamic;
pub mod expr;
pub mod manager;
mod markup;
pub mod node;
pub mod parser;
pub mod render;
mod scan;
pub mod template;
mod xml;

pub use dynamic::{DYNAMIC_DIALECT, DynamicParserFactory};
pub use expr::{CmpOp, Expr};
pub use manager::{SqlManager, SqlUnit};
pub use node::{Foreach, Node, Segment, Trim};
pub use parser::{CompiledSql, ParserFactory, SqlParser};
pub use render::RenderedSql;
pub use template::{TEMPLATE_DIALECT, TemplateParserFactory};
