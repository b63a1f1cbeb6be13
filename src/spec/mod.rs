//! Spec-file language: lexer, parser, AST, and writer.
//!
//! - [`lexer::Lexer`] - position-tracked token scanner
//! - [`parser::Parser`] - recursive descent to the typed AST
//! - [`ast::SpecFile`] - the parse unit
//! - [`writer::write_file`] - AST back to source text

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod writer;

pub use ast::{
    Assertion, AuthConfig, Body, Capture, CaptureSource, Metadata, Method, MultipartField,
    MultipartValue, Operator, Request, SpecFile, Subject, Variable,
};
pub use parser::{parse_file, parse_str, Parser};
