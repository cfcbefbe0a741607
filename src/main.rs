fn main() {
    if let Err(err) = sdfg_layout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
