use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::error::JsonPayloadError;
use actix_web::{get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::content::{ContentGenerator, OpenAiCompletions};
use crate::domain_rating::{AhrefsProvider, RatingChecker, RatingProvider};
use crate::outreach::{EmailTransport, OutreachSender, ResendTransport};
use crate::scraper::{ContactScraper, ContactSource};
use crate::search_engine::{DuckDuckGoSearch, SearchEngine, WebsiteRecord};
use crate::sequencer::{Sequencer, Stage};
use crate::storage::Storage;

pub struct AppState {
    pub search: SearchEngine,
    pub ratings: RatingChecker,
    pub outreach: OutreachSender,
    pub storage: Storage,
    pub sequencer: Mutex<Sequencer>,
    pub config: Config,
}

/// Resolve credential presence into capability handles exactly once; every
/// component below this point holds a handle or runs in its mock mode.
pub fn build_state(config: Config) -> AppState {
    let contacts: Arc<dyn ContactSource> = Arc::new(ContactScraper::new());
    let search = SearchEngine::new(Arc::new(DuckDuckGoSearch::new()), contacts);

    let rating_provider = config
        .ahrefs_api_key
        .as_deref()
        .map(|key| Arc::new(AhrefsProvider::new(key)) as Arc<dyn RatingProvider>);
    let ratings = RatingChecker::new(rating_provider);

    let completion_provider = config.openai_api_key.as_deref().map(|key| {
        Arc::new(OpenAiCompletions::new(key)) as Arc<dyn crate::content::CompletionProvider>
    });
    let content = ContentGenerator::new(
        completion_provider,
        &config.sender_name,
        &config.agency_name,
    );

    let transport = config
        .resend_api_key
        .as_deref()
        .map(|key| Arc::new(ResendTransport::new(key)) as Arc<dyn EmailTransport>);
    let outreach = OutreachSender::new(content, transport, &config.from_address);

    let storage = Storage::new(config.supabase_url.is_some() && config.supabase_key.is_some());
    let sequencer = Mutex::new(Sequencer::new(config.email_delay, config.max_follow_ups));

    AppState {
        search,
        ratings,
        outreach,
        storage,
        sequencer,
        config,
    }
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "message": "Link outreach API is running"
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    niche: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

#[post("/api/search")]
async fn search_niche(
    body: web::Json<SearchRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let niche = match body.niche.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => {
            return HttpResponse::BadRequest().json(json!({ "error": "Niche is required" }));
        }
    };

    let search_term = format!("{} blog sponsored posts", niche);
    info!("Searching for: {}", search_term);

    match data.search.discover(&search_term, body.limit).await {
        Ok(websites) => {
            let websites = data.storage.store_websites(websites);
            HttpResponse::Ok().json(json!({ "websites": websites }))
        }
        Err(e) => {
            error!("Search error: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "error": "Failed to perform search" }))
        }
    }
}

#[derive(Deserialize)]
struct CheckDrRequest {
    websites: Option<Vec<WebsiteRecord>>,
}

#[post("/api/check-dr")]
async fn check_dr(body: web::Json<CheckDrRequest>, data: web::Data<AppState>) -> impl Responder {
    let Some(websites) = body.into_inner().websites else {
        return HttpResponse::BadRequest()
            .json(json!({ "error": "Valid websites array is required" }));
    };

    let websites = data.ratings.check_domain_ratings(websites).await;

    let threshold = data.config.dr_threshold;
    let worth_pursuing = websites
        .iter()
        .filter(|w| w.dr.unwrap_or(0) >= threshold)
        .count();
    info!(
        "{} of {} websites meet the DR threshold of {}",
        worth_pursuing,
        websites.len(),
        threshold
    );

    HttpResponse::Ok().json(json!({ "websites": websites }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest {
    website: Option<WebsiteRecord>,
    email_type: Option<Stage>,
}

#[post("/api/send-email")]
async fn send_email(
    body: web::Json<SendEmailRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let request = body.into_inner();
    let website = match request.website {
        Some(w) if w.email.is_some() => w,
        _ => {
            return HttpResponse::BadRequest()
                .json(json!({ "error": "Valid website with email is required" }));
        }
    };

    // An explicit stage is honored as-is; otherwise the sequencer picks the
    // next stage this domain is due for (initial for an unknown site).
    let stage = match request.email_type {
        Some(stage) => stage,
        None => {
            let eligible = data
                .sequencer
                .lock()
                .unwrap()
                .eligible_stage(&website.domain, Utc::now());
            match eligible {
                Some(stage) => stage,
                None => {
                    let outcome = json!({
                        "success": false,
                        "error": "No outreach stage currently eligible",
                        "website": website,
                    });
                    return HttpResponse::Ok().json(json!({ "result": outcome }));
                }
            }
        }
    };

    let outcome = data.outreach.send_outreach(&website, stage).await;

    if outcome.success {
        let attempt = outcome.attempt();
        data.sequencer
            .lock()
            .unwrap()
            .record(&website.domain, &attempt);
    }

    HttpResponse::Ok().json(json!({ "result": outcome }))
}

/// Malformed request bodies still get a JSON error body.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = err.to_string();
    actix_web::error::InternalError::from_response(
        err,
        HttpResponse::BadRequest().json(json!({ "error": message })),
    )
    .into()
}

pub async fn run(config: Config) -> std::io::Result<()> {
    let port = config.port;
    let state = web::Data::new(build_state(config));

    info!("Starting web server at http://0.0.0.0:{}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(health_check)
            .service(search_niche)
            .service(check_dr)
            .service(send_email)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
