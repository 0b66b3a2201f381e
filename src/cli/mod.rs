use std::path::PathBuf;

use crate::sema::BuildParams;

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let first = match args.next() {
        Some(arg) => arg,
        None => {
            print_usage();
            return 1;
        }
    };
    // `opalc check file.opal` and `opalc file.opal` mean the same thing.
    let input = if first == "check" {
        match args.next() {
            Some(arg) => arg,
            None => {
                print_usage();
                return 1;
            }
        }
    } else {
        first
    };
    let mut params = BuildParams::default();
    for arg in args {
        match arg.as_str() {
            "-v" | "--verbose" => params.very_verbose = true,
            "--no-helpful" => params.helpful = false,
            "--no-inline" => params.inlining = false,
            "--dump-ast" => params.dump_ast = true,
            other if other.starts_with("--rounds=") => {
                match other["--rounds=".len()..].parse::<u32>() {
                    Ok(n) if n > 0 => params.max_rounds = n,
                    _ => {
                        eprintln!("expected a positive round count in {}", other);
                        return 1;
                    }
                }
            }
            other => {
                eprintln!("unknown argument: {}", other);
                print_usage();
                return 1;
            }
        }
    }
    let input_path = PathBuf::from(&input);
    if input_path.extension().and_then(|s| s.to_str()) != Some("opal") {
        eprintln!("expected .opal source file");
        return 1;
    }
    match crate::compile::check_file(&input_path, &params) {
        Ok(checked) => {
            if params.dump_ast {
                print!("{}", checked.dump());
            }
            0
        }
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    }
}

fn print_usage() {
    eprintln!("usage: opalc [check] <input.opal> [-v] [--no-helpful] [--no-inline] [--rounds=N] [--dump-ast]");
}
