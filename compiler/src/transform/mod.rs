// transform/ — Whole-function rewrite passes
//
// Every pass here is a `Mutate` implementation driven by `mutate_function`,
// which rebuilds the function through a fresh `IrBuilder`. Rebuilt values are
// re-emitted, so scope checks and struct-info inference apply to pass output
// exactly as they do to hand-built IR.

pub mod mutator;
pub mod normalize;
pub mod rewrite_dataflow_reshape;
pub mod to_anf;

pub use mutator::{module_globals, mutate_function, Mutate};
pub use normalize::{normalize, Normalize};
pub use rewrite_dataflow_reshape::{rewrite_dataflow_reshape, RewriteDataflowReshape};
pub use to_anf::{is_atomic, to_anf, ToAnf};
