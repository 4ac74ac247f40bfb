extern crate jemallocator;

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod activator;
mod autoscaler;
mod env;
mod errors;
mod fnapi_client;
mod fnpod;
mod pool;
mod service;

use controller_proto::controller_server::ControllerServer;
use env::Env;
use fnapi_client::FnApi;
use k8s_openapi::api::core::v1::Pod;
use log::info;
use pool::WarmPool;
use service::ControllerService;
use std::sync::Arc;
use term_colors::*;
use tonic::transport::Server;

const DEFAULT_PORT: u16 = 9091;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let env = Arc::new(Env::load());
    info!(
        "controller {} starting in namespace {}",
        cyan(&env.controller_name),
        cyan(&env.namespace)
    );

    let pool = Arc::new(WarmPool::new());
    tokio::spawn(pool::run(pool.clone(), env.clone()));
    tokio::spawn(autoscaler::run(env.clone()));

    let fnapi = FnApi::connect();
    let api: kube::Api<Pod> = k8s::client::new().await;

    let port = std::env::var("CONTROLLER_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("0.0.0.0:{}", port).parse()?;

    info!("Controller listening on {}", cyan(format!("{}", addr)));
    Server::builder()
        .add_service(ControllerServer::new(ControllerService::new(
            env, pool, fnapi, api,
        )))
        .serve(addr)
        .await?;
    Ok(())
}
