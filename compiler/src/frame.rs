// frame.rs — Frame stack: function and block scopes
//
// A frame accumulates state while its scope is open and is finalized into
// an immutable IR node on exit: a block frame into a `BindingBlock`
// appended to the enclosing function frame, a function frame into a
// `Function` added to the builder's module.
//
// Preconditions: frames are entered and exited in strict LIFO order by the
//   single thread that owns the builder.
// Postconditions: on successful exit, dataflow vars bound in the closed
//   block are no longer visible.
// Failure modes: ScopeError for nesting misuse, emission after a block is
//   ended, and exit with unmet obligations.
// Side effects: none outside the builder.

use crate::builder::IrBuilder;
use crate::diag::{codes, IrError};
use crate::expr::{dummy_span, AttrValue, Attrs, Expr, Span, Var};
use crate::ir::{Binding, BindingBlock, Function};
use crate::name_table::NameTable;
use crate::struct_info::StructInfo;

// ── Frames ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct FunctionFrame {
    pub name: String,
    pub span: Span,
    pub params: Vec<Var>,
    pub ret_struct_info: Option<StructInfo>,
    pub attrs: Attrs,
    pub blocks: Vec<BindingBlock>,
    /// Bindings emitted directly under the function; flushed into an
    /// implicit non-dataflow block when a block opens or the function exits.
    pub pending: Vec<Binding>,
    pub outputs: Option<Vec<Expr>>,
}

impl FunctionFrame {
    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.blocks.push(BindingBlock {
                bindings: std::mem::take(&mut self.pending),
                is_dataflow: false,
            });
        }
    }
}

#[derive(Debug)]
pub(crate) struct BlockFrame {
    pub is_dataflow: bool,
    pub bindings: Vec<Binding>,
    /// Name table as it stood when the block opened. A second visit of the
    /// same bindings restores it so generated names come out identical.
    pub name_table_snapshot: Option<NameTable>,
    /// Names the block must export, recorded by `end_block`.
    pub output_var_names: Vec<String>,
    pub block_ended: bool,
}

#[derive(Debug)]
pub(crate) enum Frame {
    Function(FunctionFrame),
    Block(BlockFrame),
}

impl Frame {
    fn kind_name(&self) -> &'static str {
        match self {
            Frame::Function(_) => "function",
            Frame::Block(b) if b.is_dataflow => "dataflow block",
            Frame::Block(_) => "block",
        }
    }
}

// ── Scope operations ────────────────────────────────────────────────────────

impl IrBuilder {
    /// Open a function scope. Functions do not nest.
    pub fn enter_function(&mut self, name: &str) -> Result<(), IrError> {
        self.enter_function_at(name, dummy_span())
    }

    pub fn enter_function_at(&mut self, name: &str, span: Span) -> Result<(), IrError> {
        if let Some(top) = self.frames.last() {
            return Err(IrError::scope(
                span,
                format!(
                    "cannot open function '{}' inside an open {}",
                    name,
                    top.kind_name()
                ),
            ));
        }
        if self.module.get(name).is_some() {
            return Err(IrError::scope(
                span,
                format!("function '{name}' is already defined in this module"),
            )
            .with_code(codes::E0103));
        }
        self.name_table = NameTable::new();
        self.visible.clear();
        self.frames.push(Frame::Function(FunctionFrame {
            name: name.to_string(),
            span,
            params: Vec::new(),
            ret_struct_info: None,
            attrs: Attrs::new(),
            blocks: Vec::new(),
            pending: Vec::new(),
            outputs: None,
        }));
        Ok(())
    }

    /// Declare the next parameter. Only legal before any binding is emitted.
    pub fn add_param(&mut self, name: &str, struct_info: StructInfo) -> Result<Var, IrError> {
        self.check_params_open("add a parameter")?;
        let unique = self.name_table.get_unique_name(name);
        let var = Var::new(unique, struct_info, false);
        self.push_param(var.clone())?;
        Ok(var)
    }

    /// Reuse an existing var as the next parameter, keeping its identity.
    /// Rewrite passes use this to rebuild a function around its own params.
    pub fn reuse_param(&mut self, var: &Var) -> Result<(), IrError> {
        self.check_params_open("add a parameter")?;
        self.name_table.reserve(var.name());
        self.push_param(var.clone())
    }

    fn push_param(&mut self, var: Var) -> Result<(), IrError> {
        let f = self.function_frame_mut("add a parameter")?;
        f.params.push(var.clone());
        self.visible.insert(var.id());
        Ok(())
    }

    fn check_params_open(&self, what: &str) -> Result<(), IrError> {
        match self.frames.last() {
            Some(Frame::Function(f)) if f.blocks.is_empty() && f.pending.is_empty() => Ok(()),
            Some(Frame::Function(f)) => Err(IrError::scope(
                f.span,
                format!(
                    "cannot {} to '{}' after bindings have been emitted",
                    what, f.name
                ),
            )),
            Some(top) => Err(IrError::scope(
                dummy_span(),
                format!("cannot {} inside an open {}", what, top.kind_name()),
            )),
            None => Err(IrError::scope(
                dummy_span(),
                format!("cannot {what} outside a function"),
            )),
        }
    }

    pub fn set_ret_struct_info(&mut self, struct_info: StructInfo) -> Result<(), IrError> {
        let f = self.function_frame_mut("set the return struct info")?;
        f.ret_struct_info = Some(struct_info);
        Ok(())
    }

    pub fn set_attr(&mut self, key: &str, value: AttrValue) -> Result<(), IrError> {
        let f = self.function_frame_mut("set a function attribute")?;
        f.attrs = std::mem::take(&mut f.attrs).with(key, value);
        Ok(())
    }

    /// Open a block inside the current function. Blocks do not nest.
    pub fn enter_block(&mut self, is_dataflow: bool) -> Result<(), IrError> {
        let snapshot = is_dataflow.then(|| self.name_table.clone());
        let f = self.function_frame_mut("open a block")?;
        if f.outputs.is_some() {
            return Err(IrError::scope(
                f.span,
                format!("cannot open a block in '{}' after its outputs", f.name),
            ));
        }
        f.flush_pending();
        self.frames.push(Frame::Block(BlockFrame {
            is_dataflow,
            bindings: Vec::new(),
            name_table_snapshot: snapshot,
            output_var_names: Vec::new(),
            block_ended: false,
        }));
        Ok(())
    }

    /// Mark the open dataflow block ended and declare its outputs. Nothing
    /// more may be emitted into the block until it is revisited.
    pub fn end_block(&mut self, outputs: &[Var]) -> Result<(), IrError> {
        let block = self.dataflow_frame_mut("end a block")?;
        if block.block_ended {
            return Err(IrError::scope(
                dummy_span(),
                "a dataflow block can only declare its outputs once",
            ));
        }
        block.block_ended = true;
        block.output_var_names = outputs.iter().map(|v| v.name().to_string()).collect();
        Ok(())
    }

    /// Start the second visit of an ended dataflow block.
    ///
    /// Discards the bindings of the first visit and restores the name table
    /// to its state at block entry, so re-emitting the same values yields
    /// the same names. Declared outputs are kept: a binding whose generated
    /// name was declared is emitted as an output var.
    pub fn revisit(&mut self) -> Result<(), IrError> {
        let block = self.dataflow_frame_mut("revisit a block")?;
        if !block.block_ended {
            return Err(IrError::scope(
                dummy_span(),
                "a dataflow block can only be revisited after end_block",
            ));
        }
        let discarded: Vec<Binding> = std::mem::take(&mut block.bindings);
        block.block_ended = false;
        let snapshot = block.name_table_snapshot.clone();
        for b in &discarded {
            self.visible.remove(&b.var.id());
        }
        if let Some(table) = snapshot {
            self.name_table = table;
        }
        Ok(())
    }

    /// Record the function's outputs. Must be called exactly once, after all
    /// blocks have closed.
    pub fn emit_func_output(&mut self, outputs: Vec<Expr>) -> Result<(), IrError> {
        match self.frames.last() {
            Some(Frame::Function(f)) if f.outputs.is_some() => {
                return Err(IrError::scope(
                    f.span,
                    format!("outputs of '{}' were already emitted", f.name),
                ))
            }
            Some(Frame::Function(_)) => {}
            Some(top) => {
                return Err(IrError::scope(
                    dummy_span(),
                    format!(
                        "function outputs cannot be emitted inside an open {}",
                        top.kind_name()
                    ),
                ))
            }
            None => {
                return Err(IrError::scope(
                    dummy_span(),
                    "function outputs emitted outside a function",
                ))
            }
        }
        let mut normalized = Vec::with_capacity(outputs.len());
        for out in &outputs {
            let out = self.normalize(out)?;
            self.check_visible(&out)?;
            normalized.push(out);
        }
        let f = self.function_frame_mut("emit outputs")?;
        f.flush_pending();
        f.outputs = Some(normalized);
        Ok(())
    }

    /// Close the innermost frame.
    pub fn exit(&mut self) -> Result<(), IrError> {
        match self.frames.pop() {
            None => Err(IrError::scope(dummy_span(), "exit with no open frame")),
            Some(Frame::Block(block)) => self.exit_block(block),
            Some(Frame::Function(f)) => self.exit_function(f),
        }
    }

    fn exit_block(&mut self, block: BlockFrame) -> Result<(), IrError> {
        for name in &block.output_var_names {
            let exported = block
                .bindings
                .iter()
                .any(|b| b.var.name() == name && !b.var.is_dataflow());
            if !exported {
                let err = IrError::scope(
                    dummy_span(),
                    format!("declared output '{name}' is not bound as a block output"),
                )
                .with_code(codes::E0102)
                .with_hint("bind it with emit_output, or revisit the block after end_block");
                self.frames.push(Frame::Block(block));
                return Err(err);
            }
        }
        for b in &block.bindings {
            if b.var.is_dataflow() {
                self.visible.remove(&b.var.id());
            }
        }
        let f = self.function_frame_mut("close a block")?;
        if !block.bindings.is_empty() {
            f.blocks.push(BindingBlock {
                bindings: block.bindings,
                is_dataflow: block.is_dataflow,
            });
        }
        Ok(())
    }

    fn exit_function(&mut self, mut f: FunctionFrame) -> Result<(), IrError> {
        let outputs = match f.outputs.take() {
            Some(o) => o,
            None => {
                let err = IrError::scope(
                    f.span,
                    format!("function '{}' exited without emitting outputs", f.name),
                )
                .with_code(codes::E0102);
                self.frames.push(Frame::Function(f));
                return Err(err);
            }
        };
        f.flush_pending();
        let ret_struct_info = f
            .ret_struct_info
            .take()
            .or_else(|| derive_ret_struct_info(&outputs));
        self.visible.clear();
        let name = f.name.clone();
        let global = ret_struct_info.clone();
        self.module.add(Function {
            name: f.name,
            params: f.params,
            blocks: f.blocks,
            outputs,
            ret_struct_info,
            attrs: f.attrs,
        })?;
        // Only a function the module accepted becomes callable.
        if let Some(ret) = global {
            self.globals.insert(name, ret);
        }
        Ok(())
    }

    // ── Frame access ──

    pub(crate) fn function_frame_mut(&mut self, what: &str) -> Result<&mut FunctionFrame, IrError> {
        match self.frames.last_mut() {
            Some(Frame::Function(f)) => Ok(f),
            Some(top) => Err(IrError::scope(
                dummy_span(),
                format!("cannot {} inside an open {}", what, top.kind_name()),
            )),
            None => Err(IrError::scope(
                dummy_span(),
                format!("cannot {what} outside a function"),
            )),
        }
    }

    pub(crate) fn dataflow_frame_mut(&mut self, what: &str) -> Result<&mut BlockFrame, IrError> {
        match self.frames.last_mut() {
            Some(Frame::Block(b)) if b.is_dataflow => Ok(b),
            _ => Err(IrError::scope(
                dummy_span(),
                format!("cannot {what} outside a dataflow block"),
            )),
        }
    }

    /// True when the innermost frame is a dataflow block.
    pub fn in_dataflow_block(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Block(b)) if b.is_dataflow)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Return struct info implied by the outputs: the single output's, or a
/// tuple of all of them.
fn derive_ret_struct_info(outputs: &[Expr]) -> Option<StructInfo> {
    match outputs {
        [single] => single.struct_info().cloned(),
        many => many
            .iter()
            .map(|o| o.struct_info().cloned())
            .collect::<Option<Vec<_>>>()
            .map(StructInfo::Tuple),
    }
}
