fn main() {
    let code = capgen_cli::run(std::env::args().collect());
    std::process::exit(code);
}
