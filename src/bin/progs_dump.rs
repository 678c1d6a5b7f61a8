use log::debug;
use progsc::progs_compiler::opcodes::Opcode;
use progsc::progs_compiler::program::ProgramData;
use std::env;
use std::fs::File;
use std::io::Read;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    let mut disassemble = false;
    let mut show_globals = false;
    let mut filename = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" => disassemble = true,
            "-g" => show_globals = true,
            "-h" | "--help" => {
                eprintln!("Usage: {} [options] <progs.dat>", args[0]);
                eprintln!("\nOptions:");
                eprintln!("  -d    Disassemble every function body");
                eprintln!("  -g    List global and field definitions");
                eprintln!("  -h    Show this help message");
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                filename = Some(arg.to_string());
                break;
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let filename = filename.unwrap_or_else(|| {
        eprintln!("Usage: {} [options] <progs.dat>", args[0]);
        eprintln!("Try '{} -h' for help", args[0]);
        std::process::exit(1);
    });

    let mut file = File::open(&filename)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    debug!("Loaded {} bytes from {}", bytes.len(), filename);

    let program = ProgramData::read(&bytes)?;
    println!("{}", program.header);

    if show_globals {
        println!("Globals:");
        for def in &program.global_defs {
            let name = program.strings.get(def.name).unwrap_or("?");
            println!("  {:>5}  type {}  {}", def.offset, def.ty, name);
        }
        println!("Fields:");
        for def in &program.field_defs {
            let name = program.strings.get(def.name).unwrap_or("?");
            println!("  {:>5}  type {}  {}", def.offset, def.ty, name);
        }
    }

    for (index, function) in program.functions.iter().enumerate().skip(1) {
        let name = program.strings.get(function.name).unwrap_or("?");
        match function.first_statement {
            n if n < 0 => println!("#{} {} = builtin #{}", index, name, -n),
            0 => println!("#{} {} (prototype)", index, name),
            n => {
                println!(
                    "#{} {} @{}  params {}  locals {}..{}",
                    index,
                    name,
                    n,
                    function.num_params,
                    function.first_local,
                    function.first_local + function.num_locals
                );
                if disassemble {
                    for (offset, statement) in program.statements.iter().enumerate().skip(n as usize) {
                        println!("  {:>6}  {}", offset, statement);
                        if statement.op == Opcode::Done {
                            break;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
