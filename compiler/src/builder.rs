// builder.rs — IR builder: frame stack + binding emitter state
//
// `IrBuilder` owns the frame stack, the name table, the set of vars visible
// at the current emission point and the module under construction. Scope
// operations live in frame.rs, emission in emit.rs; this file holds the
// shared state and the checks both sides use.
//
// Preconditions: one builder per construction thread.
// Postconditions: `finish` returns a module only when every frame is closed.
// Failure modes: ScopeError for open frames at `finish` and for references
//   to vars that are not visible.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::analysis::free_vars;
use crate::arith::Analyzer;
use crate::diag::{codes, IrError};
use crate::expr::{dummy_span, Expr};
use crate::frame::Frame;
use crate::id::VarId;
use crate::ir::IrModule;
use crate::name_table::NameTable;
use crate::struct_info::StructInfo;
use crate::type_infer::{self, InferEnv};

/// Return struct info of module functions, keyed by function name.
pub type Globals = HashMap<String, StructInfo>;

#[derive(Debug, Default)]
pub struct IrBuilder {
    pub(crate) frames: Vec<Frame>,
    pub(crate) name_table: NameTable,
    pub(crate) visible: HashSet<VarId>,
    pub(crate) module: IrModule,
    pub(crate) globals: Globals,
    pub(crate) analyzer: Analyzer,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder that resolves calls to the functions of `module`, for passes
    /// that rebuild one function at a time.
    pub fn with_globals(globals: Globals) -> Self {
        IrBuilder {
            globals,
            ..Self::default()
        }
    }

    /// Close construction and hand over the module.
    pub fn finish(self) -> Result<IrModule, IrError> {
        if let Some(top) = self.frames.last() {
            let what = match top {
                Frame::Function(f) => format!("function '{}'", f.name),
                Frame::Block(_) => "block".to_string(),
            };
            return Err(IrError::scope(
                dummy_span(),
                format!("finish called while {what} is still open"),
            )
            .with_code(codes::E0102));
        }
        Ok(self.module)
    }

    pub fn module(&self) -> &IrModule {
        &self.module
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Fill in struct info bottom-up.
    pub fn normalize(&self, expr: &Expr) -> Result<Expr, IrError> {
        type_infer::normalize(expr, &self.env())
    }

    /// Infer struct info for `expr` from its children, ignoring any cached
    /// struct info on `expr` itself.
    pub fn infer_struct_info(&self, expr: &Expr) -> Result<StructInfo, IrError> {
        type_infer::infer_node(expr, &self.env())
    }

    pub(crate) fn env(&self) -> InferEnv<'_> {
        InferEnv {
            globals: &self.globals,
            analyzer: &self.analyzer,
        }
    }

    /// Every var `expr` references must be visible at the emission point.
    pub(crate) fn check_visible(&self, expr: &Expr) -> Result<(), IrError> {
        for var in free_vars(expr) {
            if !self.visible.contains(&var.id()) {
                let mut err = IrError::scope(
                    expr.span(),
                    format!("variable '{}' is not visible here", var.name()),
                )
                .with_code(codes::E0101);
                if var.is_dataflow() {
                    err = err.with_hint(
                        "dataflow vars are private to their block; bind the value with emit_output to use it outside",
                    );
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorKind;
    use crate::expr::Var;
    use crate::struct_info::DataType;

    #[test]
    fn finish_with_open_frame_fails() {
        let mut b = IrBuilder::new();
        b.enter_function("main").unwrap();
        let err = b.finish().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Scope);
        assert_eq!(err.diagnostic.code, Some(codes::E0102));
    }

    #[test]
    fn unbound_var_is_rejected() {
        let mut b = IrBuilder::new();
        b.enter_function("main").unwrap();
        let stray = Var::new("stray", StructInfo::tensor_static(&[1], DataType::Int32), false);
        let err = b.emit(Expr::var(&stray)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Scope);
        assert_eq!(err.diagnostic.code, Some(codes::E0101));
    }

    #[test]
    fn globals_resolve_calls_to_module_functions() {
        let ret = StructInfo::tensor_static(&[3], DataType::Float32);
        let mut globals = Globals::new();
        globals.insert("helper".to_string(), ret.clone());
        let b = IrBuilder::with_globals(globals);
        let call = Expr::call(
            crate::expr::CallTarget::Global("helper".into()),
            vec![],
            Default::default(),
        );
        let e = b.normalize(&call).unwrap();
        assert_eq!(e.struct_info(), Some(&ret));
    }
}
