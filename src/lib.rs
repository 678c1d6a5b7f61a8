pub mod progs_compiler;
