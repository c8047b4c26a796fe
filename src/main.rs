use std::process::exit;

fn main() {
    if let Err(e) = postpager::app::run_cli() {
        postpager::output::error(e);
        exit(1);
    }
}
