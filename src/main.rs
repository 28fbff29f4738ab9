use std::process;

fn main() {
    if let Err(err) = seqcheck::app::run() {
        eprintln!("fatal: {err:#}");
        process::exit(1);
    }
}
