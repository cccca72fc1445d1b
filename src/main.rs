use mimalloc::MiMalloc;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    coverview::init_tracing();
    match coverview::cli::parse_from_env().and_then(coverview::run_from_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("coverview: {error}");
            ExitCode::from(1)
        }
    }
}
