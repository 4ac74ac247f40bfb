extern crate jemallocator;

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod controller_client;
mod env;
mod errors;
mod http;
mod routes;
mod watcher;

use controller_client::Controller;
use env::Env;
use http::RouterState;
use log::info;
use routes::RouteTable;
use std::sync::Arc;
use term_colors::*;

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let env = Arc::new(Env::load());
    info!(
        "router starting in namespace {}",
        cyan(&env.namespace)
    );

    let table = Arc::new(RouteTable::new());
    tokio::spawn(watcher::run(table.clone(), env.clone()));

    let state = RouterState {
        table,
        controller: Controller::connect(),
    };

    let mut c = rocket::Config::default();
    // Leaving this at rocket's 127.0.0.1 default makes the router
    // unreachable from outside its own pod.
    c.address = "0.0.0.0".parse().unwrap();
    rocket::custom(c)
        .manage(state)
        .mount(
            "/",
            rocket::routes![
                http::exec_get,
                http::exec_post,
                http::exec_put,
                http::exec_patch,
                http::exec_delete,
                http::exec_head,
                http::exec_options,
            ],
        )
        .launch()
        .await
        .unwrap();
}
