fn main() {
    let code = puppet_postrun::run_cli();
    if code != 0 {
        std::process::exit(code);
    }
}
