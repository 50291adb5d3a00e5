fn main() {
    if let Err(err) = datadict_update::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
