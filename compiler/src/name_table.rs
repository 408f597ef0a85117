// name_table.rs — Unique var-name generation
//
// Maps each base name to the last numeric suffix handed out for it. The
// first request for `lv` yields `lv`, later ones `lv1`, `lv2`, ... skipping
// any candidate that is already taken. Dots are not legal in var names and
// become underscores.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    alloc: HashMap<String, u32>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a name derived from `prefix` that this table has never issued.
    pub fn get_unique_name(&mut self, prefix: &str) -> String {
        let prefix = prefix.replace('.', "_");
        let mut unique = prefix.clone();
        if let Some(counter) = self.alloc.get(&prefix).copied() {
            let mut n = counter;
            loop {
                n += 1;
                unique = format!("{prefix}{n}");
                if !self.alloc.contains_key(&unique) {
                    break;
                }
            }
            self.alloc.insert(prefix, n);
        }
        self.alloc.insert(unique.clone(), 0);
        unique
    }

    /// Mark `name` as taken without issuing it.
    pub fn reserve(&mut self, name: &str) {
        self.alloc.entry(name.to_string()).or_insert(0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.alloc.contains_key(name)
    }
}
