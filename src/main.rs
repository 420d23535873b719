fn main() {
    if let Err(err) = dymo::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
