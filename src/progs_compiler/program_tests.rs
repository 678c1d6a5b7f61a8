// Progs image format tests

#[cfg(test)]
mod program_tests {
    use crate::progs_compiler::error::CompilerError;
    use crate::progs_compiler::opcodes::Opcode;
    use crate::progs_compiler::program::*;
    use test_log::test;

    fn sample() -> ProgramData {
        let mut program = ProgramData {
            header: Header {
                version: 6,
                crc: 5927,
                entity_fields: 4,
                ..Header::default()
            },
            statements: vec![
                Statement::new(Opcode::Done, 0, 0, 0),
                Statement::new(Opcode::AddF, 28, 29, 30),
                Statement::new(Opcode::IfNot, 30, -2, 0),
                Statement::new(Opcode::Done, 0, 0, 0),
            ],
            global_defs: vec![Definition {
                ty: 2,
                offset: 28,
                name: 1,
            }],
            field_defs: vec![Definition {
                ty: 3,
                offset: 0,
                name: 3,
            }],
            functions: vec![
                FunctionRecord::default(),
                FunctionRecord {
                    first_statement: 1,
                    first_local: 31,
                    num_locals: 2,
                    name: 9,
                    num_params: 2,
                    param_sizes: [1, 3, 0, 0, 0, 0, 0, 0],
                    ..FunctionRecord::default()
                },
            ],
            global_data: vec![0; 31],
            strings: StringTable::new(vec![
                String::new(),
                "x".to_string(),
                "origin".to_string(),
                "main".to_string(),
            ]),
        };
        program.global_data[28] = 1.5f32.to_bits();
        program.layout();
        program
    }

    #[test]
    fn test_layout_places_sections_in_file_order() {
        let program = sample();
        let header = &program.header;
        assert_eq!(header.statements.offset, HEADER_SIZE as i32);
        assert_eq!(header.global_defs.offset, 60 + 4 * 8);
        assert_eq!(header.field_defs.offset, header.global_defs.offset + 8);
        assert_eq!(header.functions.offset, header.field_defs.offset + 8);
        assert_eq!(header.global_data.offset, header.functions.offset + 2 * 36);
        assert_eq!(header.string_data.offset, header.global_data.offset + 31 * 4);
        assert_eq!(header.string_data.count, 1 + 2 + 7 + 5);
    }

    #[test]
    fn test_serialized_size_matches_layout() {
        let program = sample();
        let bytes = program.to_bytes();
        let header = &program.header;
        assert_eq!(
            bytes.len(),
            (header.string_data.offset + header.string_data.count) as usize
        );
        // crc follows the version
        assert_eq!(&bytes[0..8], &[6, 0, 0, 0, 0x27, 0x17, 0, 0]);
    }

    #[test]
    fn test_read_back_reconstructs_the_model() {
        let program = sample();
        let read = ProgramData::read(&program.to_bytes()).unwrap();
        assert_eq!(read, program);
        assert_eq!(f32::from_bits(read.global_data[28]), 1.5);
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let bytes = sample().to_bytes();
        let err = ProgramData::read(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, CompilerError::ImageFormat(_)), "{}", err);
        assert!(ProgramData::read(&bytes[..20]).is_err());
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[HEADER_SIZE] = 200;
        let err = ProgramData::read(&bytes).unwrap_err();
        assert_eq!(err, CompilerError::ImageFormat("unknown opcode 200".to_string()));
    }

    #[test]
    fn test_string_lookup_by_offset() {
        let strings = StringTable::new(vec![String::new(), "self".to_string(), "world".to_string()]);
        assert_eq!(strings.get(0), Some(""));
        assert_eq!(strings.get(1), Some("self"));
        assert_eq!(strings.get(3), Some("lf"));
        assert_eq!(strings.get(6), Some("world"));
        assert_eq!(strings.get(40), None);
        assert_eq!(StringTable::from_blob(&strings.to_blob()).unwrap(), strings);
    }

    #[test]
    fn test_header_dump() {
        let dump = sample().header.to_string();
        assert!(dump.contains("Progs version:            6"));
        assert!(dump.contains("Entity fields:            4"));
    }
}
