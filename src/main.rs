#[tokio::main]
async fn main() {
    concert_program_lib::init_logging();
    if let Err(err) = concert_program_lib::run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
