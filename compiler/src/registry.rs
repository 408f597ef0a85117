// registry.rs — Operator inference registry
//
// Name-keyed table of operator definitions. Each definition declares its
// inputs (name and struct-info category) and a pure inference function
// `fn(&Call, &InferCtx) -> Result<StructInfo, IrError>`. The builtin table
// is assembled once from the `op` modules and never mutated afterwards.
//
// Preconditions: none.
// Postconditions: `global()` always returns the same fully populated table.
// Failure modes: `register` rejects a second definition under a taken name.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::diag::IrError;
use crate::expr::Call;
use crate::op::{self, InferCtx};
use crate::struct_info::StructInfo;

// ── Definitions ─────────────────────────────────────────────────────────────

/// Inference rule of one operator.
pub type InferFn = fn(&Call, &InferCtx<'_>) -> Result<StructInfo, IrError>;

/// Struct-info category an operator argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    Tensor,
    Shape,
    Tuple,
    /// No category requirement, e.g. a kernel reference.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub description: &'static str,
}

/// One registered operator.
#[derive(Debug, Clone)]
pub struct OpDef {
    pub name: &'static str,
    pub description: &'static str,
    pub args: Vec<ArgSpec>,
    pub infer: InferFn,
}

impl OpDef {
    pub fn new(name: &'static str, infer: InferFn) -> Self {
        OpDef {
            name,
            description: "",
            args: Vec::new(),
            infer,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Declare the next positional argument.
    pub fn arg(mut self, name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        self.args.push(ArgSpec {
            name,
            kind,
            description,
        });
        self
    }

    pub fn num_inputs(&self) -> usize {
        self.args.len()
    }
}

/// Errors raised while assembling a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateOp { name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateOp { name } => {
                write!(f, "operator '{}' is registered more than once", name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

// ── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Registry {
    ops: BTreeMap<&'static str, OpDef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: OpDef) -> Result<(), RegistryError> {
        if self.ops.contains_key(def.name) {
            return Err(RegistryError::DuplicateOp {
                name: def.name.to_string(),
            });
        }
        self.ops.insert(def.name, def);
        Ok(())
    }

    /// Register every definition, keeping the first of any duplicate name
    /// and reporting the rest.
    pub fn from_defs(defs: impl IntoIterator<Item = OpDef>) -> (Registry, Vec<RegistryError>) {
        let mut registry = Registry::new();
        let mut errors = Vec::new();
        for def in defs {
            if let Err(e) = registry.register(def) {
                errors.push(e);
            }
        }
        (registry, errors)
    }

    /// The builtin operator set.
    pub fn builtin() -> Registry {
        Registry::from_defs(op::builtin_ops()).0
    }

    pub fn lookup(&self, name: &str) -> Option<&OpDef> {
        self.ops.get(name)
    }

    /// Definitions in name order.
    pub fn ops(&self) -> impl Iterator<Item = &OpDef> {
        self.ops.values()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Compact JSON of the operator table, sorted by name. Stable across
    /// runs; used for the registry fingerprint.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct OpRepr<'a> {
            name: &'a str,
            num_inputs: usize,
            arguments: &'a [ArgSpec],
            description: &'a str,
        }
        let ops: Vec<OpRepr<'_>> = self
            .ops
            .values()
            .map(|d| OpRepr {
                name: d.name,
                num_inputs: d.num_inputs(),
                arguments: &d.args,
                description: d.description,
            })
            .collect();
        serde_json::to_string(&ops)
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Process-wide builtin registry, built on first use.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::struct_info::StructInfo;

    fn object(_: &Call, _: &InferCtx<'_>) -> Result<StructInfo, IrError> {
        Ok(StructInfo::Unknown)
    }

    #[test]
    fn builtin_names_are_unique() {
        let (registry, errors) = Registry::from_defs(op::builtin_ops());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(registry.len() > 40);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut r = Registry::new();
        r.register(OpDef::new("dup_op", object)).unwrap();
        let err = r.register(OpDef::new("dup_op", object)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateOp {
                name: "dup_op".into()
            }
        );
        assert!(err.to_string().contains("dup_op"));
    }

    #[test]
    fn global_contains_core_ops() {
        let r = global();
        for name in ["add", "less", "nn.relu", "call_tir", "vm.builtin.reshape", "take"] {
            assert!(r.lookup(name).is_some(), "missing {name}");
        }
        assert_eq!(r.lookup("nn.batch_norm").map(OpDef::num_inputs), Some(5));
    }

    #[test]
    fn canonical_json_is_sorted_and_compact() {
        let json = global().canonical_json().unwrap();
        assert!(!json.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let names: Vec<&str> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(json, global().canonical_json().unwrap());
    }
}
