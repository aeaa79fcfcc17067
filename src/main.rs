use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpRequest, HttpResponse, HttpServer};
use futures::stream;
use mongodb::Client;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod balance;
mod error;
mod expenses;
mod groups;
mod invite;
mod schemas;
mod settle;
mod watch;

use auth::IdentityVerifier;
use error::SplitError;
use schemas::User;

const DATABASE_NAME: &str = "splitpot";

fn identify(verifier: &IdentityVerifier, request: &HttpRequest) -> Result<User, SplitError> {
    verifier
        .verify_request(request)
        .ok_or(SplitError::Unauthorized)
}

#[derive(Deserialize)]
struct NewGroupJson {
    name: String,
    #[serde(default)]
    description: String,
}

#[post("/groups")]
async fn add_group(
    client: web::Data<Client>,
    verifier: web::Data<IdentityVerifier>,
    request: HttpRequest,
    json: web::Json<NewGroupJson>,
) -> Result<HttpResponse, SplitError> {
    let user = identify(verifier.get_ref(), &request)?;
    let json = json.into_inner();
    let db = client.database(DATABASE_NAME);
    let group = groups::create_group(&db, &json.name, &json.description, &user).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[get("/groups/{id}")]
async fn get_group(
    client: web::Data<Client>,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let db = client.database(DATABASE_NAME);
    let group = groups::get_group(&db, &id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[derive(Deserialize)]
struct JoinGroupJson {
    code: String,
}

#[post("/groups/join")]
async fn join_group(
    client: web::Data<Client>,
    verifier: web::Data<IdentityVerifier>,
    request: HttpRequest,
    json: web::Json<JoinGroupJson>,
) -> Result<HttpResponse, SplitError> {
    let user = identify(verifier.get_ref(), &request)?;
    let db = client.database(DATABASE_NAME);
    let group = groups::join_group(&db, &json.code, &user).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/leave")]
async fn leave_group(
    client: web::Data<Client>,
    verifier: web::Data<IdentityVerifier>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let user = identify(verifier.get_ref(), &request)?;
    let db = client.database(DATABASE_NAME);
    groups::leave_group(&db, &id.into_inner(), &user.id).await?;
    Ok(HttpResponse::Ok().body("Left the group"))
}

#[get("/groups/{id}/balance")]
async fn get_balance(
    client: web::Data<Client>,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let db = client.database(DATABASE_NAME);
    let id = id.into_inner();
    let group = groups::get_group(&db, &id).await?;
    let expenses = expenses::group_expenses(&db, &id).await?;
    let balances = balance::calculate_balances(&expenses, &group.member_ids)?;
    Ok(HttpResponse::Ok().json(balances))
}

#[get("/groups/{id}/settlements")]
async fn get_settlements(
    client: web::Data<Client>,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let db = client.database(DATABASE_NAME);
    let id = id.into_inner();
    let group = groups::get_group(&db, &id).await?;
    let expenses = expenses::group_expenses(&db, &id).await?;
    let balances = balance::calculate_balances(&expenses, &group.member_ids)?;
    Ok(HttpResponse::Ok().json(settle::suggest_settlements(&balances)))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    client: web::Data<Client>,
    verifier: web::Data<IdentityVerifier>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<expenses::NewExpense>,
) -> Result<HttpResponse, SplitError> {
    identify(verifier.get_ref(), &request)?;
    let db = client.database(DATABASE_NAME);
    let expense = expenses::add_expense(&db, &id.into_inner(), json.into_inner()).await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[get("/groups/{id}/expenses")]
async fn get_expenses(
    client: web::Data<Client>,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let db = client.database(DATABASE_NAME);
    let expenses = expenses::group_expenses(&db, &id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(expenses))
}

#[get("/me/groups")]
async fn my_groups(
    client: web::Data<Client>,
    verifier: web::Data<IdentityVerifier>,
    request: HttpRequest,
) -> Result<HttpResponse, SplitError> {
    let user = identify(verifier.get_ref(), &request)?;
    let db = client.database(DATABASE_NAME);
    let overviews = groups::user_groups(&db, &user.id).await?;
    Ok(HttpResponse::Ok().json(overviews))
}

#[get("/groups/{id}/events")]
async fn group_events(
    client: web::Data<Client>,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let db = client.database(DATABASE_NAME);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let subscription = watch::watch_group(&db, &id.into_inner(), move |group| {
        let _ = tx.send(group);
    })
    .await?;
    Ok(event_stream(rx, subscription))
}

#[get("/groups/{id}/expenses/events")]
async fn expense_events(
    client: web::Data<Client>,
    id: web::Path<String>,
) -> Result<HttpResponse, SplitError> {
    let db = client.database(DATABASE_NAME);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let subscription = watch::watch_group_expenses(&db, &id.into_inner(), move |expense| {
        let _ = tx.send(expense);
    })
    .await?;
    Ok(event_stream(rx, subscription))
}

// Bridges a watcher to a server-sent-event body. Dropping the response
// stream drops the subscription, which tears the watcher down.
fn event_stream<T: serde::Serialize + 'static>(
    rx: UnboundedReceiver<T>,
    subscription: watch::Subscription,
) -> HttpResponse {
    let events = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        match rx.recv().await {
            Some(item) => {
                let payload = serde_json::to_string(&item).ok()?;
                let chunk = web::Bytes::from(format!("data: {payload}\n\n"));
                Some((Ok::<_, Infallible>(chunk), (rx, subscription)))
            }
            None => {
                subscription.cancel();
                None
            }
        }
    });
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .streaming(events)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let uri = std::env::var("MONGODB_URI").expect("You need to add the MONGODB_URI to the env");
    let secret =
        std::env::var("IDENTITY_SECRET").expect("You need to add the IDENTITY_SECRET to the env");

    let client = Client::with_uri_str(uri).await.expect("failed to connect");
    info!("connected to the document store");

    let verifier = web::Data::new(IdentityVerifier::new(secret));

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(client.clone()))
            .app_data(verifier.clone())
            .service(add_group)
            .service(get_group)
            .service(join_group)
            .service(leave_group)
            .service(get_balance)
            .service(get_settlements)
            .service(add_expense)
            .service(get_expenses)
            .service(my_groups)
            .service(group_events)
            .service(expense_events)
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
