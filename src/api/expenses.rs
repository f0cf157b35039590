//! Expense CRUD endpoints. Every handler runs behind the auth guard and
//! operates only on rows owned by the current user.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{CreateExpenseRequest, Expense, UpdateExpenseRequest};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::validation::{
    validate_amount, validate_category, validate_date, validate_description, validate_uuid,
};
use super::MessageResponse;

fn validate_create_request(req: &CreateExpenseRequest) -> Result<(), ApiError> {
    validate_amount(req.amount).map_err(ApiError::bad_request)?;
    validate_category(&req.category).map_err(ApiError::bad_request)?;
    validate_description(&req.description).map_err(ApiError::bad_request)?;
    validate_date(&req.date).map_err(ApiError::bad_request)?;
    Ok(())
}

fn validate_update_request(req: &UpdateExpenseRequest) -> Result<(), ApiError> {
    if let Some(amount) = req.amount {
        validate_amount(amount).map_err(ApiError::bad_request)?;
    }
    if let Some(category) = &req.category {
        validate_category(category).map_err(ApiError::bad_request)?;
    }
    if let Some(description) = &req.description {
        validate_description(description).map_err(ApiError::bad_request)?;
    }
    validate_date(&req.date).map_err(ApiError::bad_request)?;
    Ok(())
}

/// List the current user's expenses, newest date first
///
/// GET /api/expenses
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let expenses: Vec<Expense> =
        sqlx::query_as("SELECT * FROM expenses WHERE user_id = ? ORDER BY date DESC")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(expenses))
}

/// Record a new expense
///
/// POST /api/expenses
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    validate_create_request(&req)?;

    let now = Utc::now().to_rfc3339();
    let expense = Expense {
        id: Uuid::new_v4().to_string(),
        user_id: user.id,
        amount: req.amount,
        category: req.category.trim().to_string(),
        description: req.description.trim().to_string(),
        date: req.date.unwrap_or_else(|| now.clone()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO expenses (id, user_id, amount, category, description, date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&expense.id)
    .bind(&expense.user_id)
    .bind(expense.amount)
    .bind(&expense.category)
    .bind(&expense.description)
    .bind(&expense.date)
    .bind(&expense.created_at)
    .bind(&expense.updated_at)
    .execute(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(expense)))
}

/// Update an expense, only if it belongs to the current user
///
/// PUT /api/expenses/:id
pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Result<Json<Expense>, ApiError> {
    validate_uuid(&id, "expense id").map_err(ApiError::bad_request)?;
    validate_update_request(&req)?;

    let existing: Option<Expense> =
        sqlx::query_as("SELECT * FROM expenses WHERE id = ? AND user_id = ?")
            .bind(&id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;

    if existing.is_none() {
        return Err(ApiError::not_found("Expense not found or not authorized"));
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE expenses SET \
            amount = COALESCE(?, amount), \
            category = COALESCE(?, category), \
            description = COALESCE(?, description), \
            date = COALESCE(?, date), \
            updated_at = ? \
         WHERE id = ? AND user_id = ?",
    )
    .bind(req.amount)
    .bind(req.category.as_ref().map(|c| c.trim().to_string()))
    .bind(req.description.as_ref().map(|d| d.trim().to_string()))
    .bind(&req.date)
    .bind(&now)
    .bind(&id)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let updated: Expense = sqlx::query_as("SELECT * FROM expenses WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(updated))
}

/// Delete an expense, only if it belongs to the current user
///
/// DELETE /api/expenses/:id
pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_uuid(&id, "expense id").map_err(ApiError::bad_request)?;

    let result = sqlx::query("DELETE FROM expenses WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Expense not found or not authorized"));
    }

    Ok(Json(MessageResponse {
        message: "Expense deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use axum::response::IntoResponse;

    async fn test_state() -> Arc<AppState> {
        let pool = db::init_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), pool))
    }

    async fn seed_user(state: &AppState, id: &str, email: &str) -> CurrentUser {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(email)
        .bind("hash")
        .bind("A")
        .bind(&now)
        .bind(&now)
        .execute(&state.db)
        .await
        .unwrap();

        CurrentUser {
            id: id.to_string(),
            email: email.to_string(),
            name: "A".to_string(),
        }
    }

    fn create_request(amount: f64, category: &str) -> Json<CreateExpenseRequest> {
        Json(CreateExpenseRequest {
            amount,
            category: category.to_string(),
            description: "test expense".to_string(),
            date: None,
        })
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let state = test_state().await;
        let user = seed_user(&state, "u1", "a@x.com").await;

        let (status, Json(first)) = create_expense(
            State(state.clone()),
            user.clone(),
            Json(CreateExpenseRequest {
                amount: 10.0,
                category: "Food".to_string(),
                description: "lunch".to_string(),
                date: Some("2026-01-01T12:00:00+00:00".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let (_, Json(second)) = create_expense(
            State(state.clone()),
            user.clone(),
            Json(CreateExpenseRequest {
                amount: 25.0,
                category: "Transport".to_string(),
                description: "train".to_string(),
                date: Some("2026-02-01T12:00:00+00:00".to_string()),
            }),
        )
        .await
        .unwrap();

        let Json(expenses) = list_expenses(State(state.clone()), user).await.unwrap();
        assert_eq!(expenses.len(), 2);
        // Newest date first
        assert_eq!(expenses[0].id, second.id);
        assert_eq!(expenses[1].id, first.id);
    }

    #[tokio::test]
    async fn test_create_defaults_date_to_now() {
        let state = test_state().await;
        let user = seed_user(&state, "u1", "a@x.com").await;

        let (_, Json(expense)) =
            create_expense(State(state.clone()), user, create_request(5.0, "Misc"))
                .await
                .unwrap();

        assert!(!expense.date.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&expense.date).is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_negative_amount() {
        let state = test_state().await;
        let user = seed_user(&state, "u1", "a@x.com").await;

        let err = create_expense(State(state.clone()), user, create_request(-5.0, "Misc"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_user() {
        let state = test_state().await;
        let alice = seed_user(&state, "u1", "a@x.com").await;
        let bob = seed_user(&state, "u2", "b@x.com").await;

        create_expense(State(state.clone()), alice.clone(), create_request(10.0, "Food"))
            .await
            .unwrap();

        let Json(bobs) = list_expenses(State(state.clone()), bob).await.unwrap();
        assert!(bobs.is_empty());

        let Json(alices) = list_expenses(State(state.clone()), alice).await.unwrap();
        assert_eq!(alices.len(), 1);
    }

    #[tokio::test]
    async fn test_update_own_expense() {
        let state = test_state().await;
        let user = seed_user(&state, "u1", "a@x.com").await;

        let (_, Json(expense)) =
            create_expense(State(state.clone()), user.clone(), create_request(10.0, "Food"))
                .await
                .unwrap();

        let Json(updated) = update_expense(
            State(state.clone()),
            user,
            Path(expense.id.clone()),
            Json(UpdateExpenseRequest {
                amount: Some(12.5),
                category: None,
                description: None,
                date: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.amount, 12.5);
        // Untouched fields survive a partial update
        assert_eq!(updated.category, "Food");
        assert_eq!(updated.date, expense.date);
    }

    #[tokio::test]
    async fn test_update_foreign_expense_is_not_found() {
        let state = test_state().await;
        let alice = seed_user(&state, "u1", "a@x.com").await;
        let bob = seed_user(&state, "u2", "b@x.com").await;

        let (_, Json(expense)) =
            create_expense(State(state.clone()), alice, create_request(10.0, "Food"))
                .await
                .unwrap();

        let err = update_expense(
            State(state.clone()),
            bob,
            Path(expense.id),
            Json(UpdateExpenseRequest {
                amount: Some(0.0),
                category: None,
                description: None,
                date: None,
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_own_expense() {
        let state = test_state().await;
        let user = seed_user(&state, "u1", "a@x.com").await;

        let (_, Json(expense)) =
            create_expense(State(state.clone()), user.clone(), create_request(10.0, "Food"))
                .await
                .unwrap();

        let Json(message) = delete_expense(State(state.clone()), user.clone(), Path(expense.id))
            .await
            .unwrap();
        assert_eq!(message.message, "Expense deleted successfully");

        let Json(remaining) = list_expenses(State(state.clone()), user).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_delete_foreign_expense_is_not_found() {
        let state = test_state().await;
        let alice = seed_user(&state, "u1", "a@x.com").await;
        let bob = seed_user(&state, "u2", "b@x.com").await;

        let (_, Json(expense)) =
            create_expense(State(state.clone()), alice, create_request(10.0, "Food"))
                .await
                .unwrap();

        let err = delete_expense(State(state.clone()), bob, Path(expense.id))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_id_is_bad_request() {
        let state = test_state().await;
        let user = seed_user(&state, "u1", "a@x.com").await;

        let err = delete_expense(State(state.clone()), user, Path("not-a-uuid".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
