// Storage allocator
//
// Hands out global and local slots for variables, constants and strings.
// Three pools deduplicate their entries (references by slot, constants by
// value, strings by text). A scope stack resolves names innermost first and,
// when scope folding is on, returns locals of closed scopes to a free list.

use super::config::CompilerOptions;
use super::instruction::Ref;
use super::types::Type;
use super::value::Value;
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use std::fmt;

pub const BUILTIN_SCOPE: &str = "<builtin>";
pub const GLOBAL_SCOPE: &str = "<global>";

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub reference: Ref,
    pub ty: Type,
    pub value: Option<Value>,
    pub name: String,
    pub tags: IndexSet<String>,
}

impl Entry {
    fn new(reference: Ref, ty: Type, value: Option<Value>, name: String) -> Self {
        let mut tags = IndexSet::new();
        tags.insert(name.clone());
        Entry {
            reference,
            ty,
            value,
            name,
            tags,
        }
    }

    /// Record another purpose for this slot. Debug aid only.
    pub fn tag(&mut self, tag: &str) {
        if self.tags.insert(tag.to_string()) {
            self.name.push('|');
            self.name.push_str(tag);
        }
    }
}

/// One deduplicating pool with per-scope bookkeeping for slot reuse.
#[derive(Debug, Default)]
pub struct AllocationMap {
    entries: Vec<Entry>,
    by_ref: IndexMap<Ref, usize>,
    by_value: IndexMap<Value, usize>,
    by_name: IndexMap<String, Vec<usize>>,
    free: VecDeque<usize>,
    scopes: Vec<Vec<usize>>,
}

impl AllocationMap {
    pub fn all(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_ref(&self, reference: Ref) -> Option<&Entry> {
        self.by_ref.get(&reference).map(|&i| &self.entries[i])
    }

    pub fn by_value(&self, value: &Value) -> Option<&Entry> {
        self.by_value.get(value).map(|&i| &self.entries[i])
    }

    /// Every entry ever allocated under `name`, oldest first
    pub fn history(&self, name: &str) -> Vec<&Entry> {
        self.by_name
            .get(name)
            .map(|indices| indices.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    fn insert(&mut self, entry: Entry, reusable: bool) -> usize {
        self.insert_indexed(entry, reusable, true)
    }

    fn insert_indexed(&mut self, entry: Entry, reusable: bool, by_value: bool) -> usize {
        let index = self.entries.len();
        self.by_ref.insert(entry.reference, index);
        if let (true, Some(value)) = (by_value, &entry.value) {
            self.by_value.entry(value.clone()).or_insert(index);
        }
        self.by_name
            .entry(entry.name.clone())
            .or_default()
            .push(index);
        if reusable {
            if let Some(scope) = self.scopes.last_mut() {
                scope.push(index);
            }
        }
        self.entries.push(entry);
        index
    }

    fn tag(&mut self, index: usize, name: &str) {
        self.entries[index].tag(name);
        let history = self.by_name.entry(name.to_string()).or_default();
        if !history.contains(&index) {
            history.push(index);
        }
    }

    /// Take a freed slot of exactly `ty`, if any
    fn recycle(&mut self, name: &str, ty: &Type) -> Option<usize> {
        let position = self
            .free
            .iter()
            .position(|&i| self.entries[i].ty == *ty)?;
        let index = self.free.remove(position)?;
        self.tag(index, name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(index);
        }
        Some(index)
    }

    /// Drop freed local slots overlapping `start..start + size` so a live slot is never handed out twice
    fn claim(&mut self, start: i32, size: i32) {
        let entries = &self.entries;
        self.free.retain(|&i| match entries[i].reference {
            Ref::Local(j) => j + entries[i].ty.size_of() as i32 <= start || start + size <= j,
            _ => true,
        });
    }

    fn push(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop(&mut self, clear_free: bool) {
        if let Some(released) = self.scopes.pop() {
            for index in released.into_iter().rev() {
                self.free.push_front(index);
            }
        }
        if clear_free {
            self.free.clear();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Builtin,
    Global,
    Function,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    References,
    Constants,
    Strings,
    Functions,
}

#[derive(Debug)]
pub struct Scope {
    pub id: String,
    pub kind: ScopeKind,
    pub inside_function: bool,
    symbols: IndexMap<String, (Pool, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub name: String,
    pub offset: i32,
    pub ty: Type,
}

#[derive(Debug)]
pub struct Allocator {
    options: CompilerOptions,
    references: AllocationMap,
    constants: AllocationMap,
    strings: AllocationMap,
    functions: AllocationMap,
    scopes: Vec<Scope>,
    fields: IndexMap<String, FieldSlot>,
    entity_fields: i32,
    temp_counter: usize,
    local_counter: i32,
    global_counter: i32,
    string_ptr: i32,
}

impl Allocator {
    pub fn new(options: CompilerOptions) -> Self {
        let mut allocator = Allocator {
            options,
            references: AllocationMap::default(),
            constants: AllocationMap::default(),
            strings: AllocationMap::default(),
            functions: AllocationMap::default(),
            scopes: Vec::new(),
            fields: IndexMap::new(),
            entity_fields: 0,
            temp_counter: 0,
            local_counter: 0,
            global_counter: 0,
            string_ptr: 0,
        };
        allocator.allocate_string("");
        allocator.push(BUILTIN_SCOPE, ScopeKind::Builtin);
        allocator.allocate_constant(Value::Int(0), Type::Bool, Some("false"));
        allocator.allocate_constant(Value::Int(1), Type::Bool, Some("true"));
        allocator.push(GLOBAL_SCOPE, ScopeKind::Global);
        allocator
    }

    pub fn push(&mut self, id: &str, kind: ScopeKind) {
        let inside_function = kind == ScopeKind::Function
            || self.scopes.last().is_some_and(|s| s.inside_function);
        if kind == ScopeKind::Function {
            self.local_counter = 0;
        }
        log::debug!(
            "SCOPE push '{}' ({:?}, inside_function={})",
            id,
            kind,
            inside_function
        );
        self.scopes.push(Scope {
            id: id.to_string(),
            kind,
            inside_function,
            symbols: IndexMap::new(),
        });
        self.references.push();
    }

    pub fn pop(&mut self) {
        if self.scopes.len() <= 2 {
            log::warn!("ignoring pop of permanent scope");
            return;
        }
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        let still_inside = self.inside_function();
        let crossed_function = scope.inside_function && !still_inside;
        log::debug!("SCOPE pop '{}'", scope.id);
        self.references
            .pop(crossed_function && !self.options.overlap_locals);
    }

    pub fn inside_function(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.inside_function)
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_scope(&self) -> Option<&Scope> {
        self.scopes.last()
    }

    /// Resolve a name from the innermost scope outwards
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
            .map(|&(pool, index)| &self.pool(pool).entries[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn allocate_reference(
        &mut self,
        name: Option<&str>,
        ty: Type,
        value: Option<Value>,
        storage: Storage,
    ) -> Entry {
        let name = match name {
            Some(name) => {
                self.warn_redeclaration(name);
                name.to_string()
            }
            None => {
                let temp = format!("var{}", self.temp_counter);
                self.temp_counter += 1;
                temp
            }
        };

        if value.is_none()
            && storage == Storage::Local
            && self.options.scope_folding
            && self.inside_function()
            && self.scopes.last().is_some_and(|s| s.kind != ScopeKind::Function)
        {
            if let Some(index) = self.references.recycle(&name, &ty) {
                let reference = self.references.entries[index].reference;
                log::debug!("ALLOC reusing {} for '{}'", reference, name);
                if let Ref::Local(start) = reference {
                    let size = ty.size_of() as i32;
                    self.references.claim(start, size);
                    self.local_counter = self.local_counter.max(start + size);
                }
                self.bind(&name, Pool::References, index);
                return self.references.entries[index].clone();
            }
        }

        let size = ty.size_of() as i32;
        let reference = match storage {
            Storage::Local => {
                let index = self.local_counter;
                self.local_counter += size;
                self.references.claim(index, size);
                Ref::Local(index)
            }
            Storage::Global => {
                let index = self.options.user_storage_start + self.global_counter;
                self.global_counter += size;
                Ref::Global(index)
            }
        };
        let reusable = value.is_none() && storage == Storage::Local;
        let index = self
            .references
            .insert(Entry::new(reference, ty, value, name.clone()), reusable);
        self.bind(&name, Pool::References, index);
        self.references.entries[index].clone()
    }

    pub fn allocate_constant(&mut self, value: Value, ty: Type, name: Option<&str>) -> Entry {
        if let Value::String(text) = &value {
            let offset = match self.allocate_string(text).reference {
                Ref::Global(offset) => offset,
                _ => 0,
            };
            let label = format!("str({})", text);
            let name = name.unwrap_or(label.as_str()).to_string();
            let merge = self.options.merge_constants;
            return self.insert_constant(Value::Pointer(offset), Type::String, name, merge);
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => match &value {
                Value::Int(i) => format!("{}i", i),
                Value::Float(v) => format!("{}f", v),
                other => other.to_string(),
            },
        };
        let merge = self.options.merge_constants;
        self.insert_constant(value, ty, name, merge)
    }

    fn insert_constant(&mut self, value: Value, ty: Type, name: String, merge: bool) -> Entry {
        if merge {
            if let Some(&index) = self.constants.by_value.get(&value) {
                self.constants.tag(index, &name);
                self.bind(&name, Pool::Constants, index);
                return self.constants.entries[index].clone();
            }
        }

        let reference = Ref::Global(self.options.user_storage_start + self.global_counter);
        self.global_counter += ty.size_of().max(value.type_of().size_of()) as i32;
        // Function numbers share the pointer encoding with string offsets, so
        // they are never offered as merge targets.
        let index = self.constants.insert_indexed(
            Entry::new(reference, ty, Some(value), name.clone()),
            false,
            merge,
        );
        self.bind(&name, Pool::Constants, index);
        self.constants.entries[index].clone()
    }

    pub fn allocate_string(&mut self, text: &str) -> Entry {
        if let Some(&index) = self.strings.by_name.get(text).and_then(|v| v.first()) {
            return self.strings.entries[index].clone();
        }
        let reference = Ref::Global(self.string_ptr);
        self.string_ptr += text.len() as i32 + 1;
        let index = self.strings.insert(
            Entry::new(reference, Type::String, None, text.to_string()),
            false,
        );
        self.strings.entries[index].clone()
    }

    /// Allocate a function-table slot and bind `name` to a constant holding
    /// its index. Returns the constant.
    pub fn allocate_function(&mut self, name: &str, ty: Type) -> Entry {
        self.warn_redeclaration(name);
        let function_index = self.functions.len() as i32 + 1;
        self.functions.insert(
            Entry::new(
                Ref::Global(function_index),
                ty.clone(),
                None,
                name.to_string(),
            ),
            false,
        );
        self.insert_constant(Value::Pointer(function_index), ty, name.to_string(), false)
    }

    /// Like `allocate_function`, but bound in the permanent builtin scope so
    /// it stays visible regardless of the current nesting.
    pub fn allocate_builtin_function(&mut self, name: &str, ty: Type) -> Entry {
        let entry = self.allocate_function(name, ty);
        let binding = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.symbols.shift_remove(name));
        if let Some(binding) = binding {
            self.scopes[0].symbols.insert(name.to_string(), binding);
        }
        entry
    }

    /// Register an entity field, returning its offset within the entity
    pub fn allocate_field(&mut self, name: &str, ty: Type) -> i32 {
        if let Some(slot) = self.fields.get(name) {
            return slot.offset;
        }
        let offset = self.entity_fields;
        self.entity_fields += ty.size_of() as i32;
        self.fields.insert(
            name.to_string(),
            FieldSlot {
                name: name.to_string(),
                offset,
                ty,
            },
        );
        offset
    }

    pub fn references(&self) -> &AllocationMap {
        &self.references
    }

    pub fn constants(&self) -> &AllocationMap {
        &self.constants
    }

    pub fn strings(&self) -> &AllocationMap {
        &self.strings
    }

    pub fn functions(&self) -> &AllocationMap {
        &self.functions
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSlot> {
        self.fields.values()
    }

    pub fn entity_field_count(&self) -> i32 {
        self.entity_fields
    }

    pub fn string_size(&self) -> i32 {
        self.string_ptr
    }

    fn pool(&self, pool: Pool) -> &AllocationMap {
        match pool {
            Pool::References => &self.references,
            Pool::Constants => &self.constants,
            Pool::Strings => &self.strings,
            Pool::Functions => &self.functions,
        }
    }

    fn bind(&mut self, name: &str, pool: Pool, index: usize) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name.to_string(), (pool, index));
        }
    }

    fn warn_redeclaration(&self, name: &str) {
        if self
            .scopes
            .last()
            .is_some_and(|scope| scope.symbols.contains_key(name))
        {
            log::warn!("redeclaring '{}'", name);
        }
    }
}

impl fmt::Display for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (title, pool) in [
            ("references", &self.references),
            ("constants", &self.constants),
            ("strings", &self.strings),
            ("functions", &self.functions),
        ] {
            writeln!(f, "{} ({}):", title, pool.len())?;
            for entry in pool.all() {
                match &entry.value {
                    Some(value) => writeln!(
                        f,
                        "  {} {} {} = {}",
                        entry.reference, entry.ty, entry.name, value
                    )?,
                    None => writeln!(f, "  {} {} {}", entry.reference, entry.ty, entry.name)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
