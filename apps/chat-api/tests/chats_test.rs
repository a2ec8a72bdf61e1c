mod common;

use common::{login_client, start_server};

#[tokio::test]
async fn list_chats_returns_every_membership_with_expanded_participants() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .get(format!("http://{addr}/api/chats"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 5);
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 5);

    let dev_team = chats
        .iter()
        .find(|c| c["id"] == "3")
        .expect("group chat present");
    assert_eq!(dev_team["name"], "Dev Team");
    assert_eq!(dev_team["type"], "group");
    // Participant ids come back as full user objects.
    let participants = dev_team["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 4);
    assert!(participants.iter().any(|p| p["name"] == "Maria Santos"));
}

#[tokio::test]
async fn list_chats_requires_a_session() {
    let (addr, _state) = start_server().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/api/chats"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn get_chat_is_scoped_to_participants() {
    let (addr, _state) = start_server().await;

    let (alice, _) = login_client(addr, "alice@example.com").await;
    let resp = alice
        .get(format!("http://{addr}/api/chats/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["chat"]["id"], "1");
    assert_eq!(body["chat"]["type"], "direct");

    // Chat "1" is the alice/maria pair; dmitry is not on it.
    let (dmitry, _) = login_client(addr, "dmitry@example.com").await;
    let resp = dmitry
        .get(format!("http://{addr}/api/chats/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Access denied");
}

#[tokio::test]
async fn get_unknown_chat_is_404() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .get(format!("http://{addr}/api/chats/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Chat not found");
}

#[tokio::test]
async fn create_chat_always_includes_the_creator() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "maria@example.com").await;

    let resp = client
        .post(format!("http://{addr}/api/chats"))
        .json(&serde_json::json!({
            "name": "Design Sync",
            "participants": ["3", "4"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = resp.json().await.unwrap();
    let chat = &body["chat"];
    assert!(chat["id"].as_str().unwrap().starts_with("chat_"));
    assert_eq!(chat["name"], "Design Sync");
    // Default kind when the request omits one.
    assert_eq!(chat["type"], "group");

    let ids: Vec<&str> = chat["participants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"2"), "creator must be a participant");
    assert!(ids.contains(&"3"));
    assert!(ids.contains(&"4"));
}

#[tokio::test]
async fn create_chat_drops_unknown_participants() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .post(format!("http://{addr}/api/chats"))
        .json(&serde_json::json!({
            "name": "Ghost Hunt",
            "participants": ["999", "nope"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = resp.json().await.unwrap();
    let participants = body["chat"]["participants"].as_array().unwrap();
    // Only the creator survives.
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["id"], "1");
}

#[tokio::test]
async fn create_chat_requires_a_name() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .post(format!("http://{addr}/api/chats"))
        .json(&serde_json::json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn update_chat_edits_fields_and_bumps_updated_at() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let before: serde_json::Value = client
        .get(format!("http://{addr}/api/chats/3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let old_updated = before["chat"]["updatedAt"].as_str().unwrap().to_string();

    let resp = client
        .put(format!("http://{addr}/api/chats/3"))
        .json(&serde_json::json!({
            "name": "Core Team",
            "description": "Platform work"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["chat"]["name"], "Core Team");
    assert_eq!(body["chat"]["description"], "Platform work");
    assert_ne!(body["chat"]["updatedAt"].as_str().unwrap(), old_updated);
}

#[tokio::test]
async fn update_chat_rejects_blank_name() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .put(format!("http://{addr}/api/chats/3"))
        .json(&serde_json::json!({ "name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn delete_chat_removes_it() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .delete(format!("http://{addr}/api/chats/4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let resp = client
        .get(format!("http://{addr}/api/chats/4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn participants_endpoint_lists_members() {
    let (addr, _state) = start_server().await;
    let (client, _) = login_client(addr, "alice@example.com").await;

    let resp = client
        .get(format!("http://{addr}/api/chats/5/participants"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 5);
    assert!(participants.iter().all(|p| p["email"].is_string()));
}
