// emit.rs — Binding emitter
//
// Turns values into named bindings under the innermost frame. Every value
// is normalized (struct info filled in bottom-up) and checked for
// visibility before it is bound; the new var is visible from the next
// emission on.
//
// Var class rules:
//   - `emit` inside a dataflow block binds a dataflow var (`lv`), anywhere
//     else an ordinary var (`gv`), unless the generated name was declared
//     an output of the block, in which case it binds an ordinary var.
//   - `emit_dataflow_internal` always binds a dataflow var.
//   - `emit_output` always binds an ordinary var and only inside a
//     dataflow block.
//   - `emit_binding` re-emits an existing binding and keeps its class.
//
// Preconditions: a function frame is open.
// Postconditions: emission order equals evaluation order.
// Failure modes: ScopeError for emission after a block is ended or after
//   function outputs, for invisible vars, and for class misuse; any
//   inference error raised while normalizing the value.
// Side effects: none outside the builder.

use crate::builder::IrBuilder;
use crate::diag::IrError;
use crate::expr::{dummy_span, Expr, Var};
use crate::frame::Frame;
use crate::ir::Binding;
use crate::struct_info::StructInfo;

/// Requested class of the var an emission binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarClass {
    /// Decided by the innermost frame and the block's declared outputs.
    Normal,
    DataflowInternal,
    Output,
}

impl IrBuilder {
    /// Bind `value` to a fresh var with the default name for this scope.
    pub fn emit(&mut self, value: Expr) -> Result<Var, IrError> {
        let hint = if self.in_dataflow_block() { "lv" } else { "gv" };
        self.emit_named(value, hint)
    }

    /// Bind `value` to a fresh var whose name derives from `name_hint`.
    pub fn emit_named(&mut self, value: Expr, name_hint: &str) -> Result<Var, IrError> {
        self.emit_with_class(value, name_hint, VarClass::Normal)
    }

    /// Bind `value` to a dataflow var private to the open dataflow block.
    pub fn emit_dataflow_internal(&mut self, value: Expr) -> Result<Var, IrError> {
        self.emit_with_class(value, "lv", VarClass::DataflowInternal)
    }

    /// Bind `value` to an ordinary var that stays visible after the open
    /// dataflow block closes.
    pub fn emit_output(&mut self, value: Expr) -> Result<Var, IrError> {
        self.emit_output_named(value, "gv")
    }

    pub fn emit_output_named(&mut self, value: Expr, name_hint: &str) -> Result<Var, IrError> {
        self.emit_with_class(value, name_hint, VarClass::Output)
    }

    /// Re-emit a binding produced earlier, typically with a rewritten value.
    ///
    /// The original var is kept when the value is unchanged or its struct
    /// info is unchanged; otherwise a fresh var with the same name and class
    /// is bound and returned, and the caller remaps later uses. An ordinary
    /// var met inside a dataflow block goes through the output path; a
    /// dataflow var outside a dataflow block is an error.
    pub fn emit_binding(&mut self, binding: &Binding) -> Result<Var, IrError> {
        let old = &binding.var;
        let in_dataflow = self.in_dataflow_block();
        if old.is_dataflow() && !in_dataflow {
            return Err(IrError::scope(
                binding.value.span(),
                format!(
                    "dataflow var '{}' cannot be bound outside a dataflow block",
                    old.name()
                ),
            ));
        }
        self.check_emittable()?;

        let value = self.normalize(&binding.value)?;
        self.check_visible(&value)?;

        let unchanged = value.same_as(&binding.value)
            || value.struct_info() == Some(old.struct_info());
        let var = if unchanged {
            old.clone()
        } else {
            let sinfo = value
                .struct_info()
                .cloned()
                .unwrap_or(StructInfo::Unknown);
            Var::new(old.name(), sinfo, old.is_dataflow())
        };
        self.name_table.reserve(var.name());
        self.push_binding(Binding { var: var.clone(), value })?;
        Ok(var)
    }

    fn emit_with_class(
        &mut self,
        value: Expr,
        name_hint: &str,
        class: VarClass,
    ) -> Result<Var, IrError> {
        let in_dataflow = self.in_dataflow_block();
        match class {
            VarClass::DataflowInternal if !in_dataflow => {
                return Err(IrError::scope(
                    value.span(),
                    "emit_dataflow_internal is only legal inside a dataflow block",
                ))
            }
            VarClass::Output if !in_dataflow => {
                return Err(IrError::scope(
                    value.span(),
                    "emit_output is only legal inside a dataflow block",
                ))
            }
            _ => {}
        }
        self.check_emittable()?;

        let value = self.normalize(&value)?;
        self.check_visible(&value)?;

        let name = self.name_table.get_unique_name(name_hint);
        let is_dataflow = match class {
            VarClass::DataflowInternal => true,
            VarClass::Output => false,
            VarClass::Normal => in_dataflow && !self.is_declared_output(&name),
        };
        let sinfo = value
            .struct_info()
            .cloned()
            .unwrap_or(StructInfo::Unknown);
        let var = Var::new(name, sinfo, is_dataflow);
        self.push_binding(Binding {
            var: var.clone(),
            value,
        })?;
        Ok(var)
    }

    /// The innermost frame accepts new bindings.
    fn check_emittable(&self) -> Result<(), IrError> {
        match self.frames.last() {
            None => Err(IrError::scope(
                dummy_span(),
                "cannot emit a binding outside a function",
            )),
            Some(Frame::Block(b)) if b.block_ended => Err(IrError::scope(
                dummy_span(),
                "cannot emit into a dataflow block after its outputs were declared",
            )
            .with_hint("call revisit() to start the second visit of the block")),
            Some(Frame::Function(f)) if f.outputs.is_some() => Err(IrError::scope(
                f.span,
                format!("cannot emit into '{}' after its outputs", f.name),
            )),
            Some(_) => Ok(()),
        }
    }

    fn is_declared_output(&self, name: &str) -> bool {
        match self.frames.last() {
            Some(Frame::Block(b)) => b.output_var_names.iter().any(|n| n == name),
            _ => false,
        }
    }

    fn push_binding(&mut self, binding: Binding) -> Result<(), IrError> {
        let id = binding.var.id();
        match self.frames.last_mut() {
            Some(Frame::Block(b)) => b.bindings.push(binding),
            Some(Frame::Function(f)) => f.pending.push(binding),
            None => {
                return Err(IrError::scope(
                    binding.value.span(),
                    "cannot emit a binding outside a function",
                ))
            }
        }
        self.visible.insert(id);
        Ok(())
    }
}
