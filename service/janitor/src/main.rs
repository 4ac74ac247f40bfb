extern crate jemallocator;

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod env;
mod errors;
mod sweep;

use env::Env;
use log::error;

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let env = Env::load();
    if let Err(err) = sweep::run(&env).await {
        error!("orphan sweep failed: {}", err);
        std::process::exit(1);
    }
}
