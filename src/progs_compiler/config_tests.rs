// Compiler option loading tests

#[cfg(test)]
mod config_tests {
    use crate::progs_compiler::config::*;
    use crate::progs_compiler::error::CompilerError;
    use test_log::test;

    #[test]
    fn test_empty_document_gives_defaults() {
        let options = CompilerOptions::from_toml("").unwrap();
        assert_eq!(options, CompilerOptions::default());
        assert!(options.merge_constants);
        assert!(!options.scope_folding);
        assert_eq!(options.user_storage_start, DEFAULT_USER_STORAGE_START);
    }

    #[test]
    fn test_partial_override() {
        let options = CompilerOptions::from_toml(
            r#"
            merge_constants = false
            scope_folding = true
            source_name = "progs.src"
            "#,
        )
        .unwrap();
        assert!(!options.merge_constants);
        assert!(options.scope_folding);
        assert!(!options.overlap_locals);
        assert_eq!(options.source_name, "progs.src");
        assert_eq!(options.version, PROGS_VERSION);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = CompilerOptions::from_toml("fold_everything = true");
        assert!(matches!(result, Err(CompilerError::ConfigError(_))));
    }

    #[test]
    fn test_reserved_globals_are_protected() {
        let result = CompilerOptions::from_toml("user_storage_start = 4");
        assert!(matches!(result, Err(CompilerError::ConfigError(_))));
    }
}
