// tensir — Tensor IR core
//
// Library root: scoped IR construction (builder, frame, emit), struct-info
// inference (type_infer, registry, op), rewrite passes (transform) and their
// orchestration (pass, pipeline).

pub mod analysis;
pub mod arith;
pub mod builder;
pub mod diag;
pub mod dim;
pub mod emit;
pub mod expr;
pub mod frame;
pub mod id;
pub mod ir;
pub mod lexer;
pub mod memory;
pub mod name_table;
pub mod op;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod registry;
pub mod serial;
pub mod struct_info;
pub mod transform;
pub mod type_infer;
