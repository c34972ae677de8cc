mod admin;
mod backend;
mod config;
mod database;
mod error;
mod model;
mod notification;
mod render;
mod routes;
mod session;

use actix_web::{cookie::Key, middleware::Logger, web, App, HttpServer};
use backend::DataAccess;
use clap::Parser;
use config::Config;
use log::info;
use render::Renderer;

const SESSION_KEY: &[u8] = b"session_key";

/// The cookie signing key survives restarts when the database does.
fn session_key(db: &sled::Db) -> sled::Result<Key> {
    let meta = db.open_tree(b"meta")?;
    if let Some(master) = meta.get(SESSION_KEY)? {
        if let Ok(key) = Key::try_from(master.as_ref()) {
            return Ok(key);
        }
    }
    let key = Key::generate();
    meta.insert(SESSION_KEY, key.master())?;
    Ok(key)
}

fn startup_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("showreel=debug,actix_web=info"),
    )
    .init();

    let config = Config::parse();
    let db = config.open_db().map_err(startup_error)?;
    let backend = backend::select(&config, &db).map_err(startup_error)?;
    let dal = web::Data::new(
        DataAccess::new(backend, config.timeout()).with_admin_emails(config.admin_emails.clone()),
    );
    let templates = web::Data::new(Renderer::new(&config.templates).map_err(startup_error)?);
    let key = session_key(&db).map_err(startup_error)?;
    let secure = config.secure_cookies;

    info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(routes::session_middleware(key.clone(), secure))
            .wrap(Logger::default())
            .app_data(dal.clone())
            .app_data(templates.clone())
            .configure(routes::configure)
    })
    .bind(&config.bind)?
    .run()
    .await
}
