// Purpose: Define crate-level module surface for the resolver and tooling components.
// Inputs/Outputs: Re-exports internal modules for the binary, tests, and embedders.
// Invariants: Public module boundaries should remain stable for internal callers.
// Gotchas: Keep module wiring consistent with the src/main.rs entry path.

pub mod cli;
pub mod compile;
pub mod frontend;
pub mod sema;
