// Allocator tests: pools, deduplication, scopes and slot reuse

#[cfg(test)]
mod allocator_tests {
    use crate::progs_compiler::allocator::*;
    use crate::progs_compiler::config::CompilerOptions;
    use crate::progs_compiler::instruction::Ref;
    use crate::progs_compiler::types::Type;
    use crate::progs_compiler::value::Value;
    use test_log::test;

    fn options(merge: bool, folding: bool) -> CompilerOptions {
        CompilerOptions {
            merge_constants: merge,
            scope_folding: folding,
            ..CompilerOptions::default()
        }
    }

    /// Folding with the free list kept across functions
    fn overlapping() -> CompilerOptions {
        CompilerOptions {
            scope_folding: true,
            overlap_locals: true,
            ..CompilerOptions::default()
        }
    }

    #[test]
    fn test_builtin_constants_are_resolvable() {
        let allocator = Allocator::new(CompilerOptions::default());
        let truth = allocator.get("true").expect("true is builtin");
        assert_eq!(truth.value, Some(Value::Int(1)));
        assert_eq!(truth.ty, Type::Bool);
        assert!(allocator.get("false").is_some());
        assert_eq!(allocator.scope_depth(), 2);
    }

    #[test]
    fn test_merged_constants_share_reference() {
        let mut allocator = Allocator::new(options(true, false));
        let a = allocator.allocate_constant(Value::Int(5), Type::Int, None);
        let b = allocator.allocate_constant(Value::Int(5), Type::Int, None);
        assert_eq!(a.reference, b.reference);
        let count = allocator
            .constants()
            .all()
            .iter()
            .filter(|e| e.value == Some(Value::Int(5)))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unmerged_constants_get_distinct_slots() {
        let mut allocator = Allocator::new(options(false, false));
        let a = allocator.allocate_constant(Value::Int(5), Type::Int, None);
        let b = allocator.allocate_constant(Value::Int(5), Type::Int, None);
        assert_ne!(a.reference, b.reference);
        let (Ref::Global(x), Ref::Global(y)) = (a.reference, b.reference) else {
            panic!("constants must be global");
        };
        assert_eq!(y, x + 1);
    }

    #[test]
    fn test_merge_tags_the_shared_entry() {
        let mut allocator = Allocator::new(options(true, false));
        allocator.allocate_constant(Value::Float(2.0), Type::Float, Some("two"));
        let entry = allocator.allocate_constant(Value::Float(2.0), Type::Float, Some("deux"));
        assert_eq!(entry.name, "two|deux");
        assert!(entry.tags.contains("deux"));
        assert_eq!(allocator.get("deux").unwrap().reference, entry.reference);
    }

    #[test]
    fn test_int_and_float_constants_do_not_merge() {
        let mut allocator = Allocator::new(options(true, false));
        let a = allocator.allocate_constant(Value::Int(5), Type::Int, None);
        let b = allocator.allocate_constant(Value::Float(5.0), Type::Float, None);
        assert_ne!(a.reference, b.reference);
    }

    #[test]
    fn test_string_offsets() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        assert_eq!(allocator.allocate_string("").reference, Ref::Global(0));
        let hello = allocator.allocate_string("hello");
        assert_eq!(hello.reference, Ref::Global(1));
        let world = allocator.allocate_string("world");
        assert_eq!(world.reference, Ref::Global(7));
        assert_eq!(allocator.allocate_string("hello").reference, Ref::Global(1));
        assert_eq!(allocator.string_size(), 13);
    }

    #[test]
    fn test_string_constant_becomes_pointer() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        let entry = allocator.allocate_constant(Value::String("hi".to_string()), Type::String, None);
        assert_eq!(entry.value, Some(Value::Pointer(1)));
        assert_eq!(entry.ty, Type::String);
        assert_eq!(entry.name, "str(hi)");
    }

    #[test]
    fn test_globals_start_after_reserved_storage() {
        let mut allocator = Allocator::new(options(false, false));
        let x = allocator.allocate_reference(Some("x"), Type::Vector, None, Storage::Global);
        let y = allocator.allocate_reference(Some("y"), Type::Float, None, Storage::Global);
        // false and true occupy the first two user slots
        assert_eq!(x.reference, Ref::Global(30));
        assert_eq!(y.reference, Ref::Global(33));
    }

    #[test]
    fn test_locals_restart_per_function() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        allocator.push("first", ScopeKind::Function);
        allocator.allocate_reference(Some("a"), Type::Float, None, Storage::Local);
        let b = allocator.allocate_reference(Some("b"), Type::Float, None, Storage::Local);
        assert_eq!(b.reference, Ref::Local(1));
        allocator.pop();
        allocator.push("second", ScopeKind::Function);
        let c = allocator.allocate_reference(Some("c"), Type::Float, None, Storage::Local);
        assert_eq!(c.reference, Ref::Local(0));
        assert!(allocator.get("a").is_none());
        allocator.pop();
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        let outer = allocator.allocate_reference(Some("x"), Type::Float, None, Storage::Global);
        allocator.push("f", ScopeKind::Function);
        let inner = allocator.allocate_reference(Some("x"), Type::Vector, None, Storage::Local);
        assert_eq!(allocator.get("x").unwrap().reference, inner.reference);
        allocator.pop();
        assert_eq!(allocator.get("x").unwrap().reference, outer.reference);
    }

    #[test]
    fn test_scope_folding_reuses_sibling_slots() {
        let mut allocator = Allocator::new(options(true, true));
        allocator.push("f", ScopeKind::Function);
        allocator.push("then", ScopeKind::Block);
        let a = allocator.allocate_reference(Some("a"), Type::Float, None, Storage::Local);
        allocator.pop();
        allocator.push("else", ScopeKind::Block);
        let b = allocator.allocate_reference(Some("b"), Type::Float, None, Storage::Local);
        assert_eq!(a.reference, b.reference);
        assert!(b.name.contains("a|b"));
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_scope_folding_never_aliases_live_variables() {
        let mut allocator = Allocator::new(options(true, true));
        allocator.push("f", ScopeKind::Function);
        let a = allocator.allocate_reference(Some("a"), Type::Float, None, Storage::Local);
        allocator.push("inner", ScopeKind::Block);
        let b = allocator.allocate_reference(Some("b"), Type::Float, None, Storage::Local);
        assert_ne!(a.reference, b.reference);
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_scope_folding_requires_matching_type() {
        let mut allocator = Allocator::new(options(true, true));
        allocator.push("f", ScopeKind::Function);
        allocator.push("one", ScopeKind::Block);
        let a = allocator.allocate_reference(Some("a"), Type::Float, None, Storage::Local);
        allocator.pop();
        allocator.push("two", ScopeKind::Block);
        let v = allocator.allocate_reference(Some("v"), Type::Vector, None, Storage::Local);
        assert_ne!(a.reference, v.reference);
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_free_list_cleared_on_function_exit() {
        let mut allocator = Allocator::new(options(true, true));
        allocator.push("f", ScopeKind::Function);
        allocator.allocate_reference(Some("a"), Type::Float, None, Storage::Local);
        allocator.pop();
        assert_eq!(allocator.references().free_len(), 0);
    }

    #[test]
    fn test_overlap_locals_keeps_free_list() {
        let mut allocator = Allocator::new(overlapping());
        allocator.push("first", ScopeKind::Function);
        allocator.push("body", ScopeKind::Block);
        let x = allocator.allocate_reference(Some("x"), Type::Float, None, Storage::Local);
        allocator.pop();
        allocator.pop();
        assert_eq!(allocator.references().free_len(), 1);

        allocator.push("second", ScopeKind::Function);
        allocator.push("body", ScopeKind::Block);
        let p = allocator.allocate_reference(Some("p"), Type::Float, None, Storage::Local);
        let s = allocator.allocate_reference(Some("s"), Type::String, None, Storage::Local);
        assert_eq!(p.reference, x.reference);
        assert_ne!(p.reference, s.reference);
        assert_eq!(s.reference, Ref::Local(1));
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_fresh_local_is_not_recycled_while_live() {
        let mut allocator = Allocator::new(overlapping());
        allocator.push("first", ScopeKind::Function);
        allocator.push("body", ScopeKind::Block);
        allocator.allocate_reference(Some("x"), Type::Float, None, Storage::Local);
        allocator.pop();
        allocator.pop();

        allocator.push("second", ScopeKind::Function);
        allocator.push("body", ScopeKind::Block);
        let s = allocator.allocate_reference(Some("s"), Type::String, None, Storage::Local);
        let p = allocator.allocate_reference(Some("p"), Type::Float, None, Storage::Local);
        assert_eq!(s.reference, Ref::Local(0));
        assert_ne!(p.reference, s.reference);
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_parameters_take_leading_slots_with_overlap() {
        let mut allocator = Allocator::new(overlapping());
        allocator.push("first", ScopeKind::Function);
        allocator.push("body", ScopeKind::Block);
        allocator.allocate_reference(Some("s"), Type::String, None, Storage::Local);
        allocator.allocate_reference(Some("y"), Type::Float, None, Storage::Local);
        allocator.pop();
        allocator.pop();

        allocator.push("second", ScopeKind::Function);
        let q = allocator.allocate_reference(Some("q"), Type::Float, None, Storage::Local);
        assert_eq!(q.reference, Ref::Local(0));
        allocator.push("body", ScopeKind::Block);
        let z = allocator.allocate_reference(Some("z"), Type::Float, None, Storage::Local);
        assert_eq!(z.reference, Ref::Local(1));
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_folding_disabled_by_default() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        allocator.push("f", ScopeKind::Function);
        allocator.push("one", ScopeKind::Block);
        let a = allocator.allocate_reference(Some("a"), Type::Float, None, Storage::Local);
        allocator.pop();
        allocator.push("two", ScopeKind::Block);
        let b = allocator.allocate_reference(Some("b"), Type::Float, None, Storage::Local);
        assert_ne!(a.reference, b.reference);
        allocator.pop();
        allocator.pop();
    }

    #[test]
    fn test_permanent_scopes_survive_pop() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        allocator.pop();
        allocator.pop();
        assert_eq!(allocator.scope_depth(), 2);
        assert!(allocator.get("true").is_some());
    }

    #[test]
    fn test_functions_number_from_one() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        let ty = Type::function(Type::Void, vec![]);
        let main = allocator.allocate_function("main", ty.clone());
        let think = allocator.allocate_function("think", ty);
        assert_eq!(main.value, Some(Value::Pointer(1)));
        assert_eq!(think.value, Some(Value::Pointer(2)));
        assert_eq!(allocator.functions().len(), 2);
    }

    #[test]
    fn test_function_number_never_merges_with_string_offset() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        let text = allocator.allocate_constant(Value::String("a".to_string()), Type::String, None);
        assert_eq!(text.value, Some(Value::Pointer(1)));
        let main = allocator.allocate_function("main", Type::function(Type::Void, vec![]));
        assert_ne!(text.reference, main.reference);
        assert_eq!(allocator.get("main").unwrap().ty, Type::function(Type::Void, vec![]));
    }

    #[test]
    fn test_builtin_function_visible_from_any_scope() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        allocator.push("f", ScopeKind::Function);
        allocator.allocate_builtin_function("__builtin_mod", Type::function(Type::Float, vec![]));
        allocator.pop();
        assert!(allocator.get("__builtin_mod").is_some());
    }

    #[test]
    fn test_entity_fields() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        assert_eq!(allocator.allocate_field("origin", Type::Vector), 0);
        assert_eq!(allocator.allocate_field("health", Type::Float), 3);
        assert_eq!(allocator.allocate_field("origin", Type::Vector), 0);
        assert_eq!(allocator.entity_field_count(), 4);
    }

    #[test]
    fn test_redeclaration_keeps_history() {
        let mut allocator = Allocator::new(CompilerOptions::default());
        let first = allocator.allocate_reference(Some("x"), Type::Float, None, Storage::Global);
        let second = allocator.allocate_reference(Some("x"), Type::Float, None, Storage::Global);
        assert_ne!(first.reference, second.reference);
        assert_eq!(allocator.get("x").unwrap().reference, second.reference);
        assert_eq!(allocator.references().history("x").len(), 2);
    }
}
