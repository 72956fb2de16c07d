use link_outreach::{config::Config, logger, server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let config = Config::from_env();
    server::run(config).await
}
