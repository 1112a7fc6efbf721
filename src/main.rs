mod app;
mod entrypoints;

fn main() {
    entrypoints::main::main();
}
