use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use sanctuary::{
    encyclopedia::Encyclopedia,
    web::{router, AppState, USER_HEADER},
    Catalog, Sanctuary, SanctuarySettings,
};
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tower::ServiceExt;

fn fixture(name: &str) -> String {
    format!("{}/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn state(with_encyclopedia: bool) -> Arc<AppState> {
    let catalog = Catalog::load(fixture("catalog.yaml")).expect("catalog");
    let sanctuary = Sanctuary::new(
        Arc::new(catalog),
        SanctuarySettings {
            seed: 5,
            starting_coins: 50,
            mismatch_penalty: 0.7,
        },
    );
    let encyclopedia = with_encyclopedia
        .then(|| Encyclopedia::load(fixture("birds.json")).expect("encyclopedia"))
        .map(Arc::new);
    Arc::new(AppState::new(Arc::new(sanctuary), encyclopedia))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<u64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(USER_HEADER, user.to_string());
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

async fn signup(app: &Router, username: &str) -> u64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "username": username })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_u64().expect("user id")
}

#[tokio::test]
async fn banner_and_pings() {
    let app = router(state(false));
    let (status, body) = send(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Virtual Backyard Bird Sanctuary API running!"));

    let (_, body) = send(&app, "GET", "/api/birds/ping", None, None).await;
    assert_eq!(body, json!({ "message": "Birds route working!" }));
    let (_, body) = send(&app, "GET", "/api/economy/ping", None, None).await;
    assert_eq!(body, json!({ "message": "Economy route working!" }));
}

#[tokio::test]
async fn identity_is_required() {
    let app = router(state(false));
    let (status, body) = send(&app, "GET", "/api/yard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "No user" }));

    let (status, body) = send(&app, "GET", "/api/yard", Some(404), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "User not found" }));
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = router(state(false));
    signup(&app, "sparrow").await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "username": "sparrow" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already exists");
}

#[tokio::test]
async fn bird_catalog_routes() {
    let app = router(state(true));
    let user = signup(&app, "tern").await;

    let (status, body) = send(&app, "GET", "/api/birds?location=oregon", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<u64> = body["birds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|bird| bird["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 4, 5]);

    let (status, body) = send(&app, "GET", "/api/birds/4", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Steller's Jay");

    let (status, _) = send(&app, "GET", "/api/birds/99", Some(user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/api/birds/encyclopedia", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert_eq!(body[1]["image"], "images/birds/northerncardinal.png");
}

#[tokio::test]
async fn missing_encyclopedia_is_not_found() {
    let app = router(state(false));
    let (status, body) = send(&app, "GET", "/api/birds/encyclopedia", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Bird encyclopedia not found");
}

#[tokio::test]
async fn shop_hides_effectiveness() {
    let app = router(state(false));
    let user = signup(&app, "gull").await;

    let (_, full) = send(&app, "GET", "/api/accessories/1", Some(user), None).await;
    assert_eq!(full["effectiveness"]["3"], json!(8.0));

    let (status, shop) = send(&app, "GET", "/api/shop/food", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    let first = &shop["food"][0];
    assert_eq!(first["name"], "Sunflower Seeds");
    assert_eq!(first["type"], "seed");
    assert!(first.get("effectiveness").is_none());
}

#[tokio::test]
async fn yard_lifecycle_purchase_and_attract() {
    let app = router(state(false));
    let user = signup(&app, "plover").await;

    let (status, body) = send(&app, "GET", "/api/yard", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "yard": null }));

    let (status, body) = send(&app, "POST", "/api/yard", Some(user), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Location required");

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard",
        Some(user),
        Some(json!({ "location": "New York", "name": "Back 40", "bonusPlus": "shade" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["yard"]["location"], "New York");
    assert_eq!(body["yard"]["bonus_plus"], "shade");

    let (status, _) = send(
        &app,
        "POST",
        "/api/yard",
        Some(user),
        Some(json!({ "location": "Ohio" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/api/yard/attract", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "attracted": null }));

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/purchase",
        Some(user),
        Some(json!({ "itemType": "food", "itemId": 1, "price": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({ "success": true, "pup_coins": 40 }));

    let (_, body) = send(&app, "GET", "/api/yard/coins", Some(user), None).await;
    assert_eq!(body["pup_coins"], 40);
    assert_eq!(
        body["denominations"],
        json!([
            { "value": 25, "count": 1 },
            { "value": 10, "count": 1 },
            { "value": 5, "count": 1 }
        ])
    );

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/accessory",
        Some(user),
        Some(json!({ "accessory_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "placed": true }));

    let (status, body) = send(&app, "POST", "/api/yard/attract", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    let bird = body["attracted"]["id"].as_u64().expect("a bird is attracted");
    // Bath and seeds reach Blue Jay, Cardinal, Robin and Sparrow in New York.
    assert!([1, 2, 3, 5].contains(&bird), "unexpected bird {bird}");

    let (_, body) = send(&app, "GET", "/api/yard", Some(user), None).await;
    let birds = body["yard"]["birds"].as_array().unwrap();
    assert_eq!(birds.len(), 1);
    assert_eq!(birds[0]["id"].as_u64(), Some(bird));
    assert!(birds[0]["attracted_at"].is_string());

    let (_, body) = send(&app, "GET", "/api/shop/inventory", Some(user), None).await;
    assert_eq!(body["accessories"][0]["name"], "Bird Bath");
    assert_eq!(body["food"][0]["name"], "Sunflower Seeds");
}

#[tokio::test]
async fn earning_coins_validates_amount() {
    let app = router(state(false));
    let user = signup(&app, "crane").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/earn-coins",
        Some(user),
        Some(json!({ "amount": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid amount");

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/earn-coins",
        Some(user),
        Some(json!({ "amount": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pup_coins"], 52);
}

#[tokio::test]
async fn purchase_errors_map_to_statuses() {
    let app = router(state(false));
    let user = signup(&app, "ibis").await;

    let purchase = json!({ "itemType": "accessory", "itemId": 2 });
    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/purchase",
        Some(user),
        Some(purchase.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No yard found");

    let yard = json!({ "location": "Utah" });
    send(&app, "POST", "/api/yard", Some(user), Some(yard)).await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/yard/purchase",
        Some(user),
        Some(purchase.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", "/api/yard/purchase", Some(user), Some(purchase)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/api/yard/purchase",
        Some(user),
        Some(json!({ "itemType": "food", "itemId": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attraction_events_are_published() {
    let state = state(false);
    let mut events = state.subscribe();
    let app = router(Arc::clone(&state));
    let user = signup(&app, "swift").await;

    let yard = json!({ "location": "Anywhere" });
    send(&app, "POST", "/api/yard", Some(user), Some(yard)).await;
    let mealworms = json!({ "food_id": 2 });
    send(&app, "POST", "/api/yard/food", Some(user), Some(mealworms)).await;

    let (_, body) = send(&app, "POST", "/api/yard/attract", Some(user), None).await;
    // Mealworms only reach the Robin, which has no region.
    assert_eq!(body["attracted"]["id"], 3);

    let event = events.try_recv().expect("event published");
    assert_eq!(event.user_id.raw(), user);
    assert_eq!(event.bird.name, "American Robin");
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let app = router(state(false));
    let user = signup(&app, "rail").await;
    send(&app, "POST", "/api/yard", Some(user), Some(json!({ "location": "Iowa" }))).await;

    let empty = Some(json!({}));
    let (status, body) = send(&app, "POST", "/api/yard/accessory", Some(user), empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"].as_str().unwrap().contains("accessory_id"),
        "{body}"
    );

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/purchase",
        Some(user),
        Some(json!({ "itemType": "toy", "itemId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid item type" }));

    let (status, body) = send(&app, "GET", "/api/birds/abc", Some(user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = send(
        &app,
        "POST",
        "/api/yard/earn-coins",
        Some(user),
        Some(json!({ "amount": 2.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid amount" }));

    let empty = Some(json!({}));
    let (status, body) = send(&app, "POST", "/api/yard/earn-coins", Some(user), empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid amount");
}

#[tokio::test]
async fn first_user_administers_accounts() {
    let app = router(state(false));
    let admin = signup(&app, "osprey").await;
    let other = signup(&app, "merlin").await;
    assert_eq!(admin, 1);

    let (status, body) = send(&app, "GET", "/api/auth/users", Some(other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Not admin" }));

    let (status, body) = send(&app, "GET", "/api/auth/users", Some(admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "users": [
            { "id": admin, "username": "osprey" },
            { "id": other, "username": "merlin" }
        ] })
    );

    let uri = format!("/api/auth/users/{other}");
    let (status, body) = send(&app, "PUT", &uri, Some(admin), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username required");

    let rename = json!({ "username": "hobby" });
    let (status, body) = send(&app, "PUT", &uri, Some(admin), Some(rename)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    send(&app, "POST", "/api/yard", Some(other), Some(json!({ "location": "Maine" }))).await;
    let (status, _) = send(&app, "DELETE", &uri, Some(other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, "DELETE", &uri, Some(admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, body) = send(&app, "GET", "/api/yard", Some(other), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User not found");

    let (_, body) = send(&app, "GET", "/api/auth/users", Some(admin), None).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, "POST", "/api/auth/logout", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Logged out" }));
}

#[tokio::test]
async fn event_feed_only_carries_the_callers_birds() {
    let app = router(state(false));
    let watcher = signup(&app, "owl").await;
    let neighbour = signup(&app, "lark").await;
    for user in [watcher, neighbour] {
        send(&app, "POST", "/api/yard", Some(user), Some(json!({ "location": "Anywhere" }))).await;
        send(&app, "POST", "/api/yard/food", Some(user), Some(json!({ "food_id": 2 }))).await;
    }

    let request = Request::builder()
        .uri("/api/yard/events")
        .header(USER_HEADER, watcher.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut frames = response.into_body().into_data_stream();

    let (_, body) = send(&app, "POST", "/api/yard/attract", Some(neighbour), None).await;
    assert_eq!(body["attracted"]["id"], 3);
    let (_, body) = send(&app, "POST", "/api/yard/attract", Some(watcher), None).await;
    assert_eq!(body["attracted"]["id"], 3);

    let mut text = String::new();
    while !text.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("an event within the timeout")
            .expect("stream still open")
            .unwrap();
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    let frame = text.split("\n\n").next().unwrap();
    let field = |name: &str| {
        frame
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .map(str::trim)
    };
    assert_eq!(field("event:"), Some("attraction"), "{frame}");
    let data = field("data:").expect("data line");
    let event: Value = serde_json::from_str(data).unwrap();
    assert_eq!(event["user_id"], watcher);
    assert_eq!(event["bird"]["name"], "American Robin");
}
