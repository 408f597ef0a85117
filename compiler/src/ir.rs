// ir.rs — Finished IR: bindings, blocks, functions, modules.
//
// These are the immutable products of scope exit. A `BindingBlock` is
// produced when a block frame closes, a `Function` when a function frame
// closes, and functions accumulate in an `IrModule`.
//
// Preconditions: produced by the builder (frame.rs / emit.rs) or a pass.
// Postconditions: every bound var carries resolved (possibly Unknown)
//   struct info; bindings appear in evaluation order.
// Failure modes: `IrModule::add` rejects a duplicate function name.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use crate::diag::{codes, IrError};
use crate::expr::{dummy_span, Attrs, Expr, Var};
use crate::struct_info::StructInfo;

// ── Bindings ────────────────────────────────────────────────────────────────

/// `var = value`.
#[derive(Debug, Clone)]
pub struct Binding {
    pub var: Var,
    pub value: Expr,
}

/// An ordered run of bindings. In a dataflow block, bindings whose var is
/// not dataflow-scoped are the block's outputs.
#[derive(Debug, Clone)]
pub struct BindingBlock {
    pub bindings: Vec<Binding>,
    pub is_dataflow: bool,
}

impl BindingBlock {
    /// Vars still visible after the block closes.
    pub fn output_vars(&self) -> impl Iterator<Item = &Var> {
        self.bindings
            .iter()
            .map(|b| &b.var)
            .filter(|v| !v.is_dataflow())
    }
}

// ── Function ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Var>,
    pub blocks: Vec<BindingBlock>,
    pub outputs: Vec<Expr>,
    pub ret_struct_info: Option<StructInfo>,
    pub attrs: Attrs,
}

impl Function {
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.blocks.iter().flat_map(|b| b.bindings.iter())
    }

    pub fn num_bindings(&self) -> usize {
        self.blocks.iter().map(|b| b.bindings.len()).sum()
    }
}

// ── Module ──────────────────────────────────────────────────────────────────

/// Functions keyed by name. Iteration order is by name.
#[derive(Debug, Clone, Default)]
pub struct IrModule {
    functions: BTreeMap<String, Function>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, function: Function) -> Result<(), IrError> {
        if self.functions.contains_key(&function.name) {
            return Err(IrError::scope(
                dummy_span(),
                format!("function '{}' is already defined in this module", function.name),
            )
            .with_code(codes::E0103));
        }
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    /// Insert or overwrite; used by passes that rewrite functions in place.
    pub fn replace(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Remove and return the function called `name`.
    pub fn take(&mut self, name: &str) -> Option<Function> {
        self.functions.remove(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ── Display ─────────────────────────────────────────────────────────────────
//
// Debug dump only; there is no parser for this form.

fn fmt_binding(f: &mut fmt::Formatter<'_>, indent: &str, b: &Binding) -> fmt::Result {
    writeln!(f, "{indent}{}: {} = {}", b.var, b.var.struct_info(), b.value)
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.attrs.is_empty() {
            let parts: Vec<String> = self
                .attrs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            writeln!(f, "#[{}]", parts.join(", "))?;
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p, p.struct_info()))
            .collect();
        write!(f, "fn {}({})", self.name, params.join(", "))?;
        if let Some(ret) = &self.ret_struct_info {
            write!(f, " -> {ret}")?;
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            if block.is_dataflow {
                writeln!(f, "  dataflow {{")?;
                for b in &block.bindings {
                    fmt_binding(f, "    ", b)?;
                }
                let outs: Vec<&str> = block.output_vars().map(|v| v.name()).collect();
                if !outs.is_empty() {
                    writeln!(f, "    output {}", outs.join(", "))?;
                }
                writeln!(f, "  }}")?;
            } else {
                for b in &block.bindings {
                    fmt_binding(f, "  ", b)?;
                }
            }
        }
        let outs: Vec<String> = self.outputs.iter().map(|o| o.to_string()).collect();
        writeln!(f, "  return {}", outs.join(", "))?;
        write!(f, "}}")
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{func}")?;
        }
        Ok(())
    }
}
