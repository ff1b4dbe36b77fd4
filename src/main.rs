fn main() {
    if let Err(err) = selection_digest_lib::run() {
        eprintln!("selection-digest: {err:#}");
        std::process::exit(1);
    }
}
