mod common;

use axum::body::Body;
use axum::http::Request;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{json_body, test_settings, Harness, ADMIN_PASSWORD, WEBHOOK_SECRET};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn demo_harness() -> Harness {
    let mut settings = test_settings();
    settings.demo.enabled = true;
    settings.demo.max_projects = 1;
    settings.demo.login_attempts = 2;
    Harness::with_settings(settings, Some(WEBHOOK_SECRET))
}

#[tokio::test]
async fn test_health_and_version() {
    let harness = Harness::new();

    let response = harness.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(json_body(response).await["status"], "healthy");

    let response = harness.send(Request::get("/version").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status().as_u16(), 200);
    assert!(json_body(response).await["version"].is_string());
}

#[tokio::test]
async fn test_login() {
    let harness = Harness::new();

    let response = harness
        .send(post_json("/auth/login", json!({ "password": ADMIN_PASSWORD })))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(json_body(response).await["success"], true);

    let response = harness
        .send(post_json("/auth/login", json!({ "password": "nope" })))
        .await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_demo_login_is_rate_limited() {
    let harness = demo_harness();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = harness
            .send(post_json("/auth/login", json!({ "password": "wrong" })))
            .await;
        statuses.push(response.status().as_u16());
    }
    assert_eq!(statuses, vec![401, 401, 429]);
}

#[tokio::test]
async fn test_demo_project_quota() {
    let harness = demo_harness();

    let response = harness.send(post_json("/projects", json!({ "name": "First" }))).await;
    assert_eq!(response.status().as_u16(), 201);
    let body = json_body(response).await;
    assert_eq!(body["hostname"], "first");
    assert_eq!(body["environments"][0]["name"], "production");

    let response = harness.send(post_json("/projects", json!({ "name": "Second" }))).await;
    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["message"].as_str().unwrap().contains("Quota exceeded"));
}

#[tokio::test]
async fn test_service_lifecycle_over_http() {
    let harness = Harness::new();

    let project = json_body(harness.send(post_json("/projects", json!({ "name": "Shop" }))).await).await;
    let production = project["environments"][0]["id"].as_str().unwrap().to_string();

    let response = harness
        .send(post_json(
            &format!("/environments/{production}/services"),
            json!({ "services": [{
                "name": "web",
                "deployType": "image",
                "imageUrl": "nginx:1.27",
                "containerPort": 80,
                "autoDeploy": false,
            }] }),
        ))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let created = json_body(response).await;
    let service_id = created[0]["id"].as_str().unwrap().to_string();
    assert_eq!(created[0]["hostname"], "web-shop");
    assert!(created[0]["jobId"].is_null());

    let domains = json_body(
        harness
            .send(Request::get(format!("/services/{service_id}/domains")).body(Body::empty()).unwrap())
            .await,
    )
    .await;
    assert_eq!(domains[0]["domain"], "web-shop.apps.test");

    let response = harness
        .send(post_json(&format!("/services/{service_id}/deploy"), json!({})))
        .await;
    assert_eq!(response.status().as_u16(), 202);
    let job_id = json_body(response).await["jobId"].as_str().unwrap().to_string();

    let response = harness
        .send(Request::get(format!("/jobs/{job_id}")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(json_body(response).await["status"]["state"], "queued");

    let response = harness
        .send(Request::delete(format!("/environments/{production}")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = harness
        .send(Request::delete(format!("/services/{service_id}")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let harness = Harness::new();
    let response = harness
        .send(Request::get(format!("/jobs/{}", Uuid::new_v4())).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_custom_domains() {
    let harness = Harness::new();
    let (_, _, service) = harness.seed_repo_project("Shop").await;

    let response = harness
        .send(post_json(
            &format!("/services/{}/domains", service.id),
            json!({ "domain": "Shop.Example.com" }),
        ))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let custom = json_body(response).await;
    assert_eq!(custom["domain"], "shop.example.com");

    let response = harness
        .send(post_json(
            &format!("/services/{}/domains", service.id),
            json!({ "domain": "not a host" }),
        ))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // The system domain is the only verified route left
    let domains = json_body(
        harness
            .send(Request::get(format!("/services/{}/domains", service.id)).body(Body::empty()).unwrap())
            .await,
    )
    .await;
    let system = domains
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["isSystem"] == true)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let response = harness
        .send(Request::delete(format!("/domains/{system}")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let custom_id = custom["id"].as_str().unwrap();
    let response = harness
        .send(post_json(&format!("/domains/{custom_id}/verify"), json!({})))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(json_body(response).await["dnsVerified"], true);

    let response = harness
        .send(Request::delete(format!("/domains/{system}")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn test_repository_listing_and_files() {
    let harness = Harness::new();

    let response = harness.send(Request::get("/repositories").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status().as_u16(), 200);
    let repos = json_body(response).await;
    assert_eq!(repos[0]["full_name"], "acme/shop");

    let response = harness
        .send(Request::get("/repositories/acme/shop/file?ref=feature").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let file = json_body(response).await;
    assert_eq!(file["path"], "Dockerfile");
    assert_eq!(file["content"], "FROM nginx\n");
}
