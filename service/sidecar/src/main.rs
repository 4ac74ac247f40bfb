extern crate jemallocator;

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod activate;
mod errors;
mod service;
mod state;

use log::info;
use service::SidecarService;
use sidecar_proto::sidecar_server::SidecarServer;
use term_colors::*;
use tonic::transport::Server;

const DEFAULT_PORT: u16 = 9090;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let port = std::env::var("SIDECAR_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("0.0.0.0:{}", port).parse()?;

    info!("Sidecar listening on {}", cyan(format!("{}", addr)));
    Server::builder()
        .add_service(SidecarServer::new(SidecarService::new()))
        .serve(addr)
        .await?;
    Ok(())
}
