mod auth;
mod expenses;
mod participants;

use actix_web::{web, HttpRequest};

use crate::server::auth::authenticated_user;
use crate::server::error::{ApiError, ApiResult};
use crate::server::store::{ExpenseDocument, UserDocument};
use crate::server::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .service(
                web::scope("/auth")
                    .service(auth::register)
                    .service(auth::login)
                    .service(auth::current_user),
            )
            .service(
                web::scope("/expenses")
                    .service(expenses::create_expense)
                    .service(expenses::list_expenses)
                    .service(expenses::get_expense)
                    .service(expenses::update_expense)
                    .service(expenses::delete_expense),
            )
            .service(
                web::scope("/participants")
                    .service(participants::add_participant)
                    .service(participants::update_participant)
                    .service(participants::remove_participant)
                    .service(participants::list_participants),
            ),
    );
}

async fn current_user(request: &HttpRequest, state: &AppState) -> ApiResult<UserDocument> {
    let user_id = authenticated_user(request, &state.tokens)
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid token".to_string()))?;
    state
        .store
        .user_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

async fn find_expense(state: &AppState, expense_id: &str) -> ApiResult<ExpenseDocument> {
    state
        .store
        .expense(expense_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Expense not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};

    use crate::config::ServerConfig;
    use crate::server::store::Store;

    // The client connects lazily, so no database is needed until a query runs
    async fn state() -> web::Data<AppState> {
        let config = ServerConfig {
            mongodb_uri: "mongodb://127.0.0.1:27017".to_string(),
            database: "splitex_test".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            secret_key: b"test secret".to_vec(),
            token_ttl_days: 1,
            allowed_origins: vec![],
        };
        let store = Store::connect(&config).await.unwrap();
        web::Data::new(AppState::new(store, &config))
    }

    #[actix_web::test]
    async fn requests_without_a_token_are_unauthorized() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;
        let request = test::TestRequest::get().uri("/api/expenses/").to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "Missing or invalid token");
    }

    #[actix_web::test]
    async fn malformed_bodies_get_json_errors() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;
        let request = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{\"email\":")
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert!(body["error"].is_string());
    }
}
