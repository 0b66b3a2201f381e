// Purpose: Provide the binary entry point for the opalc checker CLI.
// Inputs/Outputs: Reads process args and returns the exit code from the CLI dispatcher.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.
// Gotchas: Diagnostics render on stderr; --dump-ast output is the only stdout use.

fn main() {
    let code = opal::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
