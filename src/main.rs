fn main() {
    if let Err(err) = columnar_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(-1);
    }
}
