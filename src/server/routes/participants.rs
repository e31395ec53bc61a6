use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::schemas::{
    normalize_username, AddParticipant, Participant, SplitMethod, UpdateParticipant,
};
use crate::server::error::{ApiError, ApiResult};
use crate::server::store::ParticipantDocument;
use crate::server::AppState;
use crate::totals::unique_usernames;

use super::{current_user, find_expense};

fn not_a_participant(username: &str) -> ApiError {
    ApiError::NotFound(format!("User {username} is not a participant in this expense"))
}

#[post("/{expense_id}/add")]
pub async fn add_participant(
    request: HttpRequest,
    state: web::Data<AppState>,
    expense_id: web::Path<String>,
    json: web::Json<AddParticipant>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&request, &state).await?;
    let payload = json.into_inner();
    payload.validate()?;
    let expense = find_expense(&state, &expense_id).await?;
    if !expense.is_member(&user.username) {
        return Err(ApiError::Forbidden(
            "You do not have permission to add participants to this expense".to_string(),
        ));
    }

    let username = normalize_username(&payload.username);
    if state.store.user_by_username(&username).await?.is_none() {
        return Err(ApiError::NotFound(format!("User {username} not found")));
    }
    // Only unequal splits carry several line items per person
    if expense.split_method == SplitMethod::Equal && expense.has_participant(&username) {
        return Err(ApiError::BadRequest(format!(
            "User {username} is already a participant"
        )));
    }

    let participant = ParticipantDocument {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        amount: payload.amount.unwrap_or_default(),
        item: payload.item,
        created_at: Utc::now(),
    };
    state.store.push_participant(&expense.id, &participant).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": format!("User {username} added to expense"),
        "participant_id": participant.id,
    })))
}

#[put("/{expense_id}/update/{username}")]
pub async fn update_participant(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    json: web::Json<UpdateParticipant>,
) -> ApiResult<HttpResponse> {
    let (expense_id, username) = path.into_inner();
    let username = normalize_username(&username);
    let user = current_user(&request, &state).await?;
    let update = json.into_inner();
    update.validate(&username)?;
    let expense = find_expense(&state, &expense_id).await?;
    if !expense.is_payer(&user.username) {
        return Err(ApiError::Forbidden(
            "Only the payer can update participant details".to_string(),
        ));
    }
    if !expense.has_participant(&username) {
        return Err(not_a_participant(&username));
    }

    state
        .store
        .update_participant(&expense.id, &username, &update)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Participant {username} updated successfully"),
    })))
}

#[delete("/{expense_id}/remove/{username}")]
pub async fn remove_participant(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (expense_id, username) = path.into_inner();
    let username = normalize_username(&username);
    let user = current_user(&request, &state).await?;
    let expense = find_expense(&state, &expense_id).await?;
    if !expense.is_payer(&user.username) {
        return Err(ApiError::Forbidden(
            "Only the payer can remove participants".to_string(),
        ));
    }
    if !expense.has_participant(&username) {
        return Err(not_a_participant(&username));
    }

    state.store.pull_participant(&expense.id, &username).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Participant {username} removed successfully"),
    })))
}

#[get("/{expense_id}/participants")]
pub async fn list_participants(
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

    let names = state
        .store
        .names_of(&unique_usernames(&expense.participants))
        .await?;
    let participants: Vec<Participant> = expense
        .participants
        .iter()
        .map(|p| Participant {
            username: p.username.clone(),
            name: names.get(&p.username).cloned().flatten(),
            amount: p.amount,
            item: p.item.clone(),
            is_payer: Some(expense.is_payer(&p.username)),
        })
        .collect();
    Ok(HttpResponse::Ok().json(participants))
}
