// Type descriptor tests

#[cfg(test)]
mod types_tests {
    use crate::progs_compiler::types::*;
    use test_log::test;

    #[test]
    fn test_composite_equality_is_structural() {
        assert_eq!(Type::field(Type::Float), Type::field(Type::Float));
        assert_ne!(Type::field(Type::Float), Type::field(Type::Vector));
        assert_eq!(
            Type::function(Type::Void, vec![Type::Float, Type::Entity]),
            Type::function(Type::Void, vec![Type::Float, Type::Entity])
        );
    }

    #[test]
    fn test_sizes() {
        assert_eq!(Type::Float.size_of(), 1);
        assert_eq!(Type::Vector.size_of(), 3);
        let pair = Type::Struct(vec![
            ("origin".to_string(), Type::Vector),
            ("health".to_string(), Type::Float),
        ]);
        assert_eq!(pair.size_of(), 4);
        assert_eq!(Type::array(Type::Vector, 4).size_of(), 12);
    }

    #[test]
    fn test_family_erases_components() {
        assert_eq!(
            Type::field(Type::String).family(),
            Type::field(Type::Float).family()
        );
        assert_eq!(Type::Float.family(), Type::Float);
    }

    #[test]
    fn test_members() {
        assert_eq!(Type::Vector.member("y"), Some((1, Type::Float)));
        assert_eq!(Type::Vector.member("w"), None);
        let pair = Type::Struct(vec![
            ("origin".to_string(), Type::Vector),
            ("health".to_string(), Type::Float),
        ]);
        assert_eq!(pair.member("health"), Some((3, Type::Float)));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Type::field(Type::Float).to_string(), "field<float>");
        assert_eq!(
            Type::function(Type::Float, vec![Type::Float, Type::Int]).to_string(),
            "function(float, float, int)"
        );
        assert_eq!(Type::array(Type::Int, 3).to_string(), "array<int, 3>");
    }

    #[test]
    fn test_builtin_type_table() {
        let table = TypeTable::new();
        for name in ["void", "float", "vector", "string", "entity", "int", "bool"] {
            assert!(table.get(name).is_some(), "missing builtin type {}", name);
        }
        assert!(table.get("vec3").is_none());
    }
}
