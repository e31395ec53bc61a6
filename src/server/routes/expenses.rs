use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::schemas::{CreateExpense, Expense, UpdateExpense};
use crate::server::error::{ApiError, ApiResult};
use crate::server::store::ExpenseDocument;
use crate::server::AppState;

use super::{current_user, find_expense};

#[post("/")]
pub async fn create_expense(
    request: HttpRequest,
    state: web::Data<AppState>,
    json: web::Json<CreateExpense>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&request, &state).await?;
    let payload = json.into_inner();
    payload.validate()?;

    let now = Utc::now();
    let expense = ExpenseDocument {
        id: Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        date: payload.date.unwrap_or_else(|| now.date_naive()),
        split_method: payload.split_method.unwrap_or_default(),
        total_amount: payload.total_amount,
        payer: Some(user.username.clone()),
        members: vec![user.username.clone()],
        participants: vec![],
        created_at: now,
        updated_at: now,
    };
    state.store.insert_expense(&expense).await?;
    info!(expense_id = %expense.id, payer = %user.username, "expense created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Expense created successfully",
        "expense_id": expense.id,
    })))
}

#[get("/")]
pub async fn list_expenses(
    request: HttpRequest,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&request, &state).await?;
    let expenses: Vec<Expense> = state
        .store
        .expenses_of(&user.username)
        .await?
        .iter()
        .map(Expense::from)
        .collect();
    Ok(HttpResponse::Ok().json(expenses))
}

#[get("/{expense_id}")]
pub async fn get_expense(
    request: HttpRequest,
    state: web::Data<AppState>,
    expense_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&request, &state).await?;
    let expense = find_expense(&state, &expense_id).await?;
    if !expense.is_member(&user.username) {
        return Err(ApiError::Forbidden(
            "You do not have permission to view this expense".to_string(),
        ));
    }
    Ok(HttpResponse::Ok().json(Expense::from(&expense)))
}

#[put("/{expense_id}")]
pub async fn update_expense(
    request: HttpRequest,
    state: web::Data<AppState>,
    expense_id: web::Path<String>,
    json: web::Json<UpdateExpense>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&request, &state).await?;
    let update = json.into_inner();
    update.validate()?;
    let expense = find_expense(&state, &expense_id).await?;
    if !expense.is_payer(&user.username) {
        return Err(ApiError::Forbidden(
            "Only the payer can update this expense".to_string(),
        ));
    }
    state.store.update_expense(&expense.id, &update).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Expense updated successfully" })))
}

#[delete("/{expense_id}")]
pub async fn delete_expense(
    request: HttpRequest,
    state: web::Data<AppState>,
    expense_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&request, &state).await?;
    let expense = find_expense(&state, &expense_id).await?;
    if !expense.is_payer(&user.username) {
        return Err(ApiError::Forbidden(
            "Only the payer can delete this expense".to_string(),
        ));
    }
    if !state.store.delete_expense(&expense.id).await? {
        return Err(ApiError::NotFound("Expense not found".to_string()));
    }
    info!(expense_id = %expense.id, "expense deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Expense deleted successfully" })))
}
