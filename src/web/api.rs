use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::warn;

use super::AppState;
use crate::{
    attraction::AttractionOutcome,
    encyclopedia::EncyclopediaEntry,
    model::{Account, BirdId, BirdSpecies, Item, ItemId, ItemKind, ItemListing, NewYard, UserId},
    sanctuary::{denominations, CoinStack, Inventory, SanctuaryError, UserSummary, YardView},
};

/// Set by the auth layer in front of this service once the caller's token
/// has been verified.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

impl From<SanctuaryError> for ApiError {
    fn from(err: SanctuaryError) -> Self {
        let message = err.to_string();
        match err {
            SanctuaryError::UsernameTaken(_)
            | SanctuaryError::YardExists
            | SanctuaryError::AlreadyPlaced { .. } => ApiError::Conflict(message),
            SanctuaryError::UnknownItem { .. } => ApiError::NotFound(message),
            SanctuaryError::UnknownUser(_)
            | SanctuaryError::InvalidUsername
            | SanctuaryError::LocationRequired
            | SanctuaryError::NoYard
            | SanctuaryError::InsufficientCoins { .. }
            | SanctuaryError::InvalidAmount => ApiError::BadRequest(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Caller identity taken from [`USER_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_HEADER)
            .ok_or(ApiError::Unauthorized("No user"))?;
        header
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|id| CurrentUser(UserId(id)))
            .ok_or(ApiError::Unauthorized("Invalid user"))
    }
}

impl AppState {
    fn authorize(&self, CurrentUser(user): CurrentUser) -> Result<UserId, ApiError> {
        self.sanctuary.account(user)?;
        Ok(user)
    }

    fn authorize_admin(&self, user: CurrentUser) -> Result<UserId, ApiError> {
        let user = self.authorize(user)?;
        if self.sanctuary.is_admin(user) {
            Ok(user)
        } else {
            Err(ApiError::Forbidden("Not admin"))
        }
    }
}

#[derive(Serialize)]
pub struct Message {
    message: &'static str,
}

pub async fn banner() -> &'static str {
    "Virtual Backyard Bird Sanctuary API running!"
}

pub async fn auth_ping() -> Json<Message> {
    Json(Message {
        message: "Auth route working!",
    })
}

pub async fn birds_ping() -> Json<Message> {
    Json(Message {
        message: "Birds route working!",
    })
}

pub async fn economy_ping() -> Json<Message> {
    Json(Message {
        message: "Economy route working!",
    })
}

#[derive(Deserialize)]
pub struct UsernameRequest {
    #[serde(default)]
    username: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UsernameRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let Json(body) = body?;
    Ok(Json(state.sanctuary.register_user(&body.username)?))
}

pub async fn logout() -> Json<Message> {
    Json(Message {
        message: "Logged out",
    })
}

#[derive(Serialize)]
pub struct UserList {
    users: Vec<UserSummary>,
}

#[derive(Serialize)]
pub struct Done {
    success: bool,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<UserList> {
    state.authorize_admin(user)?;
    Ok(Json(UserList {
        users: state.sanctuary.users(),
    }))
}

pub async fn rename_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<UsernameRequest>, JsonRejection>,
) -> ApiResult<Done> {
    state.authorize_admin(user)?;
    let Path(id) = id?;
    let Json(body) = body?;
    state.sanctuary.rename_user(UserId(id), &body.username)?;
    Ok(Json(Done { success: true }))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Done> {
    state.authorize_admin(user)?;
    let Path(id) = id?;
    state.sanctuary.delete_user(UserId(id))?;
    Ok(Json(Done { success: true }))
}

#[derive(Deserialize)]
pub struct BirdQuery {
    location: Option<String>,
}

#[derive(Serialize)]
pub struct BirdList {
    birds: Vec<BirdSpecies>,
}

pub async fn list_birds(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    query: Result<Query<BirdQuery>, QueryRejection>,
) -> ApiResult<BirdList> {
    state.authorize(user)?;
    let Query(query) = query?;
    let birds = state
        .sanctuary
        .catalog()
        .birds_for_location(query.location.as_deref())
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(BirdList { birds }))
}

pub async fn get_bird(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<BirdSpecies> {
    state.authorize(user)?;
    let Path(id) = id?;
    state
        .sanctuary
        .catalog()
        .bird(BirdId(id))
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Not found".into()))
}

pub async fn encyclopedia(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<EncyclopediaEntry>> {
    match &state.encyclopedia {
        Some(book) => Ok(Json(book.entries().to_vec())),
        None => Err(ApiError::NotFound("Bird encyclopedia not found".into())),
    }
}

#[derive(Serialize)]
pub struct AccessoryList<T> {
    accessories: Vec<T>,
}

#[derive(Serialize)]
pub struct FoodList<T> {
    food: Vec<T>,
}

fn items(state: &AppState, kind: ItemKind) -> Vec<Item> {
    state.sanctuary.catalog().items(kind).to_vec()
}

fn listings(state: &AppState, kind: ItemKind) -> Vec<ItemListing> {
    state
        .sanctuary
        .catalog()
        .items(kind)
        .iter()
        .map(ItemListing::from)
        .collect()
}

fn item(state: &AppState, kind: ItemKind, id: u64) -> ApiResult<Item> {
    state
        .sanctuary
        .catalog()
        .item(kind, ItemId(id))
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Not found".into()))
}

pub async fn list_accessories(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<AccessoryList<Item>> {
    state.authorize(user)?;
    Ok(Json(AccessoryList {
        accessories: items(&state, ItemKind::Accessory),
    }))
}

pub async fn get_accessory(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Item> {
    state.authorize(user)?;
    let Path(id) = id?;
    item(&state, ItemKind::Accessory, id)
}

pub async fn list_food(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<FoodList<Item>> {
    state.authorize(user)?;
    Ok(Json(FoodList {
        food: items(&state, ItemKind::Food),
    }))
}

pub async fn get_food(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Item> {
    state.authorize(user)?;
    let Path(id) = id?;
    item(&state, ItemKind::Food, id)
}

pub async fn shop_accessories(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<AccessoryList<ItemListing>> {
    state.authorize(user)?;
    Ok(Json(AccessoryList {
        accessories: listings(&state, ItemKind::Accessory),
    }))
}

pub async fn shop_food(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<FoodList<ItemListing>> {
    state.authorize(user)?;
    Ok(Json(FoodList {
        food: listings(&state, ItemKind::Food),
    }))
}

pub async fn inventory(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Inventory> {
    let user = state.authorize(user)?;
    Ok(Json(state.sanctuary.inventory(user)?))
}

#[derive(Serialize)]
pub struct YardEnvelope {
    yard: Option<YardView>,
}

pub async fn get_yard(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<YardEnvelope> {
    let user = state.authorize(user)?;
    Ok(Json(YardEnvelope {
        yard: state.sanctuary.yard(user)?,
    }))
}

pub async fn create_yard(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Result<Json<NewYard>, JsonRejection>,
) -> ApiResult<YardEnvelope> {
    let user = state.authorize(user)?;
    let Json(body) = body?;
    let yard = state.sanctuary.create_yard(user, body)?;
    Ok(Json(YardEnvelope { yard: Some(yard) }))
}

#[derive(Deserialize)]
pub struct PlaceAccessory {
    accessory_id: u64,
}

#[derive(Deserialize)]
pub struct PlaceFood {
    food_id: u64,
}

#[derive(Serialize)]
pub struct Placed {
    success: bool,
    placed: bool,
}

fn place(state: &AppState, user: CurrentUser, kind: ItemKind, id: u64) -> ApiResult<Placed> {
    let user = state.authorize(user)?;
    let placed = state.sanctuary.place(user, kind, ItemId(id))?;
    Ok(Json(Placed {
        success: true,
        placed,
    }))
}

pub async fn place_accessory(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Result<Json<PlaceAccessory>, JsonRejection>,
) -> ApiResult<Placed> {
    let Json(body) = body?;
    place(&state, user, ItemKind::Accessory, body.accessory_id)
}

pub async fn place_food(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Result<Json<PlaceFood>, JsonRejection>,
) -> ApiResult<Placed> {
    let Json(body) = body?;
    place(&state, user, ItemKind::Food, body.food_id)
}

pub async fn attract(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<AttractionOutcome> {
    let user = state.authorize(user)?;
    let event = state.sanctuary.attract(user)?;
    if let Some(event) = &event {
        state.publish(event.clone());
    }
    Ok(Json(event.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    #[serde(default)]
    item_type: String,
    item_id: u64,
}

fn item_kind(name: &str) -> Result<ItemKind, ApiError> {
    match name {
        "accessory" => Ok(ItemKind::Accessory),
        "food" => Ok(ItemKind::Food),
        _ => Err(ApiError::BadRequest("Invalid item type".into())),
    }
}

#[derive(Serialize)]
pub struct PurchaseReceipt {
    success: bool,
    pup_coins: u64,
}

pub async fn purchase(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Result<Json<PurchaseRequest>, JsonRejection>,
) -> ApiResult<PurchaseReceipt> {
    let user = state.authorize(user)?;
    let Json(body) = body?;
    let kind = item_kind(&body.item_type)?;
    let pup_coins = state.sanctuary.purchase(user, kind, ItemId(body.item_id))?;
    Ok(Json(PurchaseReceipt {
        success: true,
        pup_coins,
    }))
}

#[derive(Serialize)]
pub struct Balance {
    pup_coins: u64,
    denominations: Vec<CoinStack>,
}

impl Balance {
    fn new(pup_coins: u64) -> Self {
        Self {
            pup_coins,
            denominations: denominations(pup_coins),
        }
    }
}

pub async fn coins(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiResult<Balance> {
    let pup_coins = state.sanctuary.coins(user.0)?;
    Ok(Json(Balance::new(pup_coins)))
}

#[derive(Deserialize)]
pub struct EarnRequest {
    #[serde(default)]
    amount: Value,
}

pub async fn earn_coins(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Result<Json<EarnRequest>, JsonRejection>,
) -> ApiResult<Balance> {
    let Json(body) = body?;
    // Whole coins only; fractions, strings and null are rejected.
    let amount = body
        .amount
        .as_u64()
        .filter(|amount| *amount >= 1)
        .ok_or(ApiError::from(SanctuaryError::InvalidAmount))?;
    let pup_coins = state.sanctuary.earn_coins(user.0, amount)?;
    Ok(Json(Balance::new(pup_coins)))
}

pub async fn yard_events(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user = state.authorize(user)?;
    let stream = BroadcastStream::new(state.subscribe()).filter_map(move |msg| match msg {
        Ok(event) if event.user_id == user => match Event::default()
            .event("attraction")
            .json_data(&event)
        {
            Ok(frame) => Some(Ok(frame)),
            Err(err) => {
                warn!("failed to encode attraction event: {err}");
                None
            }
        },
        Ok(_) => None,
        Err(err) => {
            warn!(user = %user, "attraction feed lagged: {err}");
            None
        }
    });
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
