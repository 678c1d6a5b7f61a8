// Progs Compiler Module
// Lowers expression trees to the progs register-VM image

pub mod allocator;
pub mod ast;
pub mod config;
pub mod emit;
pub mod error;
pub mod generator;
pub mod instruction;
pub mod ir;
pub mod opcodes;
pub mod printer;
pub mod program;
pub mod reduce;
pub mod registry;
pub mod types;
pub mod value;

pub use error::CompilerError;

use ast::Expr;
use config::CompilerOptions;
use emit::ProgramEmitter;
use generator::Generator;
use program::ProgramData;
use registry::OperationRegistry;
use types::TypeTable;

/// Main compiler structure
pub struct ProgsCompiler {
    options: CompilerOptions,
    registry: OperationRegistry,
    types: TypeTable,
}

impl Default for ProgsCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgsCompiler {
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        ProgsCompiler {
            options,
            registry: OperationRegistry::new(),
            types: TypeTable::new(),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Builtin type names for a front end to resolve declarations against
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Fresh generator sharing this compiler's registry and options
    pub fn generator(&self) -> Generator<'_> {
        Generator::new(&self.registry, self.options.clone())
    }

    /// Compile a whole unit into the in-memory program model
    pub fn compile(&self, roots: Vec<Expr>) -> Result<ProgramData, CompilerError> {
        // Phase 1: constant folding and IR generation
        let mut generator = self.generator();
        let ir = generator.generate_program(roots)?;
        log::trace!("IR:\n{}", ir);

        // Phase 2: statement, definition and string emission
        let mut allocator = generator.into_allocator();
        let program = ProgramEmitter::new(&mut allocator, &self.options).emit(&ir)?;
        Ok(program)
    }

    pub fn compile_to_bytes(&self, roots: Vec<Expr>) -> Result<Vec<u8>, CompilerError> {
        Ok(self.compile(roots)?.to_bytes())
    }
}
