//! # Query Engine
//!
//! A self-contained engine for the query subset used against ontology
//! graphs.
//!
//! - `lexer` / `parser`: text to syntax tree
//! - `eval` / `expr`: pattern and expression evaluation over a snapshot
//! - `update`: update operations applied inside a write transaction

pub mod ast;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod update;

pub use ast::{Query, QueryForm, UpdateOperation};
pub use eval::{Evaluator, QueryOutcome, Solution};
pub use parser::{parse_query, parse_update};
pub use update::{UpdateSummary, apply_update};
